//! Capability gating for premium tiles, fullscreen, panning, printing and geolocation

use serde::{Deserialize, Serialize};

/// Identity predicates of whoever is viewing the page
pub trait Viewer {
    /// Is the viewer authenticated
    fn is_logged_in(&self) -> bool;

    /// Does the viewer hold page-edit capability (sees compilation warnings)
    fn can_edit(&self) -> bool;
}

/// Plain viewer identity, as known to the page renderer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerIdentity {
    pub logged_in: bool,
    pub editor: bool,
}

impl ViewerIdentity {
    /// Anonymous visitor
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Logged-in user without edit rights
    pub fn member() -> Self {
        Self {
            logged_in: true,
            editor: false,
        }
    }

    /// Logged-in user who can edit pages
    pub fn editor() -> Self {
        Self {
            logged_in: true,
            editor: true,
        }
    }
}

impl Viewer for ViewerIdentity {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn can_edit(&self) -> bool {
        self.editor
    }
}

/// Recognised permission option values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    All,
    None,
    LoggedIn,
}

impl Permission {
    /// Parse an option value; unrecognised values give `None`.
    pub fn parse(option: &str) -> Option<Self> {
        match option {
            "all" => Some(Permission::All),
            "none" => Some(Permission::None),
            "logged_in" => Some(Permission::LoggedIn),
            _ => None,
        }
    }
}

/// Evaluates permission options against one viewer
#[derive(Clone, Copy)]
pub struct PermissionGate<'a> {
    viewer: &'a dyn Viewer,
}

impl<'a> PermissionGate<'a> {
    pub fn new(viewer: &'a dyn Viewer) -> Self {
        Self { viewer }
    }

    /// `all` grants, `none` denies, `logged_in` follows the viewer; anything else is `default`.
    pub fn is_permitted(&self, option: &str, default: bool) -> bool {
        match Permission::parse(option) {
            Some(Permission::All) => true,
            Some(Permission::None) => false,
            Some(Permission::LoggedIn) => self.viewer.is_logged_in(),
            None => default,
        }
    }
}

impl std::fmt::Debug for PermissionGate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("logged_in", &self.viewer.is_logged_in())
            .field("can_edit", &self.viewer.can_edit())
            .finish()
    }
}
