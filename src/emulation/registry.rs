//! Immutable id → profile lookup.

use crate::base::neterror::NetError;
use crate::emulation::profile::Profile;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

const CHROME_120: &str = include_str!("profiles/chrome_120.json");
const FIREFOX_110: &str = include_str!("profiles/firefox_110.json");
const SAFARI_17: &str = include_str!("profiles/safari_17.json");

/// A set of validated profiles, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<Profile>>,
}

impl ProfileRegistry {
    /// Start an empty registry.
    pub fn builder() -> ProfileRegistryBuilder {
        ProfileRegistryBuilder::default()
    }

    /// The registry of bundled profiles: chrome-120, firefox-110, safari-17.
    ///
    /// Parsed once per process.
    pub fn builtin() -> Result<Self, NetError> {
        static BUILTIN: OnceLock<Result<ProfileRegistry, NetError>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                Self::builder()
                    .register_json(CHROME_120)?
                    .register_json(FIREFOX_110)?
                    .register_json(SAFARI_17)
                    .map(ProfileRegistryBuilder::build)
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Result<Arc<Profile>, NetError> {
        self.profiles
            .get(id)
            .cloned()
            .ok_or_else(|| NetError::UnknownProfile(id.to_string()))
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Builder for [`ProfileRegistry`].
#[derive(Debug, Default)]
#[must_use]
pub struct ProfileRegistryBuilder {
    profiles: BTreeMap<String, Arc<Profile>>,
}

impl ProfileRegistryBuilder {
    /// Add a profile. Fails on an invalid template or a duplicate id.
    pub fn register(mut self, profile: Profile) -> Result<Self, NetError> {
        profile.validate()?;
        if self.profiles.contains_key(&profile.id) {
            return Err(NetError::InvalidOptions(format!(
                "profile {} registered twice",
                profile.id
            )));
        }
        self.profiles.insert(profile.id.clone(), Arc::new(profile));
        Ok(self)
    }

    /// Parse and add a profile from its JSON form.
    pub fn register_json(self, json: &str) -> Result<Self, NetError> {
        let profile = Profile::from_json(json)?;
        self.register(profile)
    }

    /// Start from every bundled profile.
    pub fn with_builtin(mut self) -> Result<Self, NetError> {
        for (id, profile) in ProfileRegistry::builtin()?.profiles {
            if self.profiles.contains_key(&id) {
                return Err(NetError::InvalidOptions(format!(
                    "profile {} registered twice",
                    id
                )));
            }
            self.profiles.insert(id, profile);
        }
        Ok(self)
    }

    pub fn build(self) -> ProfileRegistry {
        ProfileRegistry {
            profiles: self.profiles,
        }
    }
}
