use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::PullRequestKey;

pub const DEFAULT_MAIN_CLASS: &str = "org.example.Main";
pub const DEFAULT_MAIN_METHOD: &str = "main";

/// Analysis knobs stored per pull request by the analysis service. Opaque to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsData {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub pull_number: u64,
    #[serde(rename = "mainClass", default)]
    pub main_class: String,
    #[serde(rename = "mainMethod", default)]
    pub main_method: String,
    #[serde(rename = "baseClass", default, skip_serializing_if = "Option::is_none")]
    pub base_class: Option<String>,
}

impl SettingsData {
    pub fn for_key(key: &PullRequestKey) -> Self {
        SettingsData {
            uuid: String::new(),
            owner: key.owner.clone(),
            repository: key.repository.clone(),
            pull_number: key.pull_number,
            main_class: DEFAULT_MAIN_CLASS.to_string(),
            main_method: DEFAULT_MAIN_METHOD.to_string(),
            base_class: None,
        }
    }

    /// Blank fields fall back to their defaults; a blank base class is dropped.
    pub fn normalized(mut self) -> Self {
        if self.main_class.trim().is_empty() {
            self.main_class = DEFAULT_MAIN_CLASS.to_string();
        }
        if self.main_method.trim().is_empty() {
            self.main_method = DEFAULT_MAIN_METHOD.to_string();
        }
        self.base_class = self
            .base_class
            .take()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        self
    }

    /// Binds the settings to `key` under a fresh identifier, as done before every save.
    pub fn stamped(mut self, key: &PullRequestKey) -> Self {
        self.uuid = Uuid::new_v4().to_string();
        self.owner = key.owner.clone();
        self.repository = key.repository.clone();
        self.pull_number = key.pull_number;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_blank_fields() {
        let key = PullRequestKey::new("octo", "demo", 4);
        let mut s = SettingsData::for_key(&key);
        assert_eq!(s.main_class, DEFAULT_MAIN_CLASS);
        assert_eq!(s.main_method, DEFAULT_MAIN_METHOD);

        s.main_class = "  ".to_string();
        s.main_method = String::new();
        s.base_class = Some(" ".to_string());
        let s = s.normalized();
        assert_eq!(s.main_class, DEFAULT_MAIN_CLASS);
        assert_eq!(s.main_method, DEFAULT_MAIN_METHOD);
        assert_eq!(s.base_class, None);
    }

    #[test]
    fn stamping_assigns_fresh_ids() {
        let key = PullRequestKey::new("octo", "demo", 4);
        let a = SettingsData::for_key(&key).stamped(&key);
        let b = SettingsData::for_key(&key).stamped(&key);
        assert_ne!(a.uuid, b.uuid);
        assert!(Uuid::parse_str(&a.uuid).is_ok());
    }

    #[test]
    fn wire_names() {
        let key = PullRequestKey::new("octo", "demo", 4);
        let mut s = SettingsData::for_key(&key);
        s.base_class = Some("org.example.Base".to_string());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["mainClass"], "org.example.Main");
        assert_eq!(json["baseClass"], "org.example.Base");
        assert_eq!(json["pull_number"], 4);

        let back: SettingsData =
            serde_json::from_str(r#"{"mainMethod": "run", "owner": "o"}"#).unwrap();
        assert_eq!(back.main_method, "run");
        assert_eq!(back.main_class, "");
        assert_eq!(back.base_class, None);
    }
}
