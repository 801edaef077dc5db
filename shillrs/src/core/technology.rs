//! Technology availability tracking.
//!
//! Shill publishes three technology lists on the Manager. Each update
//! replaces the corresponding local set wholesale. `Enabling` is purely
//! local: it records enable requests that shill has not yet reflected in
//! `EnabledTechnologies`.

use std::collections::HashSet;

use crate::api::models::TechnologyState;

#[derive(Debug, Default, Clone)]
pub(crate) struct TechnologySets {
    available: HashSet<String>,
    enabled: HashSet<String>,
    enabling: HashSet<String>,
    uninitialized: HashSet<String>,
}

impl TechnologySets {
    pub(crate) fn replace_available(&mut self, technologies: &[String]) {
        self.available = technologies.iter().cloned().collect();
    }

    /// Replaces the enabled set. Anything now enabled is no longer enabling.
    pub(crate) fn replace_enabled(&mut self, technologies: &[String]) {
        self.enabled = technologies.iter().cloned().collect();
        for technology in technologies {
            self.enabling.remove(technology);
        }
    }

    pub(crate) fn replace_uninitialized(&mut self, technologies: &[String]) {
        self.uninitialized = technologies.iter().cloned().collect();
    }

    pub(crate) fn begin_enabling(&mut self, technology: &str) {
        self.enabling.insert(technology.to_owned());
    }

    pub(crate) fn enable_failed(&mut self, technology: &str) {
        self.enabling.remove(technology);
    }

    /// Optimistically forgets the technology as enabled or enabling.
    pub(crate) fn disable(&mut self, technology: &str) {
        self.enabled.remove(technology);
        self.enabling.remove(technology);
    }

    pub(crate) fn is_available(&self, technology: &str) -> bool {
        self.available.contains(technology)
    }

    /// Enabled only counts for available technologies.
    pub(crate) fn is_enabled(&self, technology: &str) -> bool {
        self.is_available(technology) && self.enabled.contains(technology)
    }

    pub(crate) fn is_enabling(&self, technology: &str) -> bool {
        self.enabling.contains(technology)
    }

    pub(crate) fn is_uninitialized(&self, technology: &str) -> bool {
        self.uninitialized.contains(technology)
    }

    pub(crate) fn state(&self, technology: &str) -> TechnologyState {
        if !self.is_available(technology) {
            TechnologyState::Unavailable
        } else if self.is_enabled(technology) {
            TechnologyState::Enabled
        } else if self.is_enabling(technology) {
            TechnologyState::Enabling
        } else if self.is_uninitialized(technology) {
            TechnologyState::Uninitialized
        } else {
            TechnologyState::Available
        }
    }
}
