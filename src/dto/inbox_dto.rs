use serde::Deserialize;

use crate::models::notification::NotificationPreferences;

/// Partial preference toggle; unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub announcements: Option<bool>,
    pub promotions: Option<bool>,
    pub application_updates: Option<bool>,
    pub message_alerts: Option<bool>,
    pub interview_alerts: Option<bool>,
}

impl PreferencesUpdate {
    pub fn apply(&self, prefs: &mut NotificationPreferences) {
        if let Some(v) = self.email_enabled {
            prefs.email_enabled = v;
        }
        if let Some(v) = self.push_enabled {
            prefs.push_enabled = v;
        }
        if let Some(v) = self.announcements {
            prefs.announcements = v;
        }
        if let Some(v) = self.promotions {
            prefs.promotions = v;
        }
        if let Some(v) = self.application_updates {
            prefs.application_updates = v;
        }
        if let Some(v) = self.message_alerts {
            prefs.message_alerts = v;
        }
        if let Some(v) = self.interview_alerts {
            prefs.interview_alerts = v;
        }
    }
}
