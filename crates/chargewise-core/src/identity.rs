//! Identity resolution: whose attributes pre-populate a prediction request.
//!
//! The viewer is a closed set of three states, dispatched once here:
//!
//! | Viewer      | Subject                                    | Privileged |
//! |-------------|--------------------------------------------|------------|
//! | `Anonymous` | none, any requested id is ignored          | no         |
//! | `Client`    | their own profile, any requested id ignored | no         |
//! | `Advisor`   | the requested client, none if unknown      | yes        |
//!
//! Profiles come from a [`UserDirectory`]; this module never mutates them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::features;
use crate::input::{ParseChoiceError, Region, Sex, Smoker};

/// Account identifier assigned by the user directory.
pub type UserId = i64;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Ordinary subject: may only see their own attributes.
    Client,
    /// Privileged reviewer: may select any client.
    Advisor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Advisor => "Advisor",
        }
    }
}

impl FromStr for Role {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "advisor" => Ok(Self::Advisor),
            _ => Err(ParseChoiceError {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Client(UserId),
    Advisor(UserId),
}

impl Viewer {
    /// Build the viewer for an authenticated account.
    pub fn authenticated(id: UserId, role: Role) -> Self {
        match role {
            Role::Client => Self::Client(id),
            Role::Advisor => Self::Advisor(id),
        }
    }

    /// Account id, `None` when anonymous.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::Client(id) | Self::Advisor(id) => Some(*id),
        }
    }

    /// Only advisors may select and view other subjects.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Advisor(_))
    }
}

/// Attribute bag supplied by the user directory.
///
/// Every insurance attribute is optional: an account may exist long before
/// its owner fills in a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub role: Role,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub children: Option<u32>,
    pub region: Option<Region>,
    pub smoker: Option<Smoker>,
}

impl Profile {
    /// A profile with only the account fields set.
    pub fn new(id: UserId, role: Role, email: impl Into<String>) -> Self {
        Self {
            id,
            role,
            email: email.into(),
            first_name: None,
            last_name: None,
            age: None,
            sex: None,
            weight_kg: None,
            height_m: None,
            children: None,
            region: None,
            smoker: None,
        }
    }

    /// BMI from the stored measurements, when both are present and usable.
    pub fn bmi(&self) -> Option<f64> {
        match (self.weight_kg, self.height_m) {
            (Some(w), Some(h)) if h > 0.0 => Some(features::bmi(w, h)),
            _ => None,
        }
    }

    /// "First Last", skipping missing parts.
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The person a request is estimating for.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// The authenticated client themself.
    Own(Profile),
    /// A client selected by an advisor.
    Selected(Profile),
}

impl Subject {
    pub fn profile(&self) -> &Profile {
        match self {
            Self::Own(p) | Self::Selected(p) => p,
        }
    }

    pub fn prefill(&self) -> Prefill {
        Prefill::from_profile(self.profile())
    }
}

/// Initial form values taken from a subject's profile.
///
/// An attribute is either present with its value or absent; absent ones are
/// left for the user to fill in and are never replaced by a zero or empty
/// default. `children: Some(0)` is a real answer, distinct from `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Prefill {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(rename = "gender", skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    #[serde(rename = "weight", skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(rename = "height", skip_serializing_if = "Option::is_none")]
    pub height_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoker: Option<Smoker>,
}

impl Prefill {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: Some(profile.email.clone()).filter(|e| !e.is_empty()),
            age: profile.age,
            sex: profile.sex,
            weight_kg: profile.weight_kg,
            height_m: profile.height_m,
            children: profile.children,
            region: profile.region,
            smoker: profile.smoker,
        }
    }

    /// True when nothing would be pre-populated.
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Present attributes as `(form field, value)` pairs, in form order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |name: &'static str, value: Option<String>| {
            if let Some(v) = value {
                out.push((name, v));
            }
        };
        push("first_name", self.first_name.clone());
        push("last_name", self.last_name.clone());
        push("email", self.email.clone());
        push("age", self.age.map(|v| v.to_string()));
        push("gender", self.sex.map(|v| v.to_string()));
        push("weight", self.weight_kg.map(|v| v.to_string()));
        push("height", self.height_m.map(|v| v.to_string()));
        push("children", self.children.map(|v| v.to_string()));
        push("region", self.region.map(|v| v.to_string()));
        push("smoker", self.smoker.map(|v| v.to_string()));
        out
    }
}

/// Source of user profiles.
pub trait UserDirectory {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Look up a single account. `Ok(None)` when the id is unknown.
    fn profile(&self, id: UserId) -> Result<Option<Profile>, Self::Error>;

    /// All accounts with the [`Role::Client`] role.
    fn clients(&self) -> Result<Vec<Profile>, Self::Error>;
}

impl<D: UserDirectory + ?Sized> UserDirectory for &D {
    type Error = D::Error;

    fn profile(&self, id: UserId) -> Result<Option<Profile>, Self::Error> {
        (**self).profile(id)
    }

    fn clients(&self) -> Result<Vec<Profile>, Self::Error> {
        (**self).clients()
    }
}

/// The directory could not be read.
#[derive(Debug, Error)]
#[error("user directory lookup failed: {0}")]
pub struct IdentityError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

/// Everything the request boundary needs about the viewer in one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub subject: Option<Subject>,
    pub privileged: bool,
    /// Clients an advisor may choose from; always empty for other viewers.
    pub selectable: Vec<Profile>,
    pub prefill: Prefill,
}

/// Decides which subject's attributes seed a request.
pub struct IdentityResolver<D> {
    directory: D,
}

impl<D: UserDirectory> IdentityResolver<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Whether the viewer may select other subjects.
    pub fn is_privileged(&self, viewer: &Viewer) -> bool {
        viewer.is_privileged()
    }

    /// Resolve the subject for `viewer`, honouring `requested` only for advisors.
    ///
    /// Unknown ids, and ids naming a non-client account, resolve to `None`
    /// rather than an error.
    pub fn resolve_subject(
        &self,
        viewer: &Viewer,
        requested: Option<UserId>,
    ) -> Result<Option<Subject>, IdentityError> {
        match *viewer {
            Viewer::Anonymous => {
                if let Some(id) = requested {
                    warn!(requested = id, "ignoring subject selection from anonymous viewer");
                }
                Ok(None)
            }
            Viewer::Client(own_id) => {
                if let Some(id) = requested
                    && id != own_id
                {
                    warn!(
                        viewer = own_id,
                        requested = id,
                        "ignoring subject selection from client viewer"
                    );
                }
                let profile = self.lookup(own_id)?;
                if profile.is_none() {
                    debug!(viewer = own_id, "client viewer has no directory profile");
                }
                Ok(profile.map(Subject::Own))
            }
            Viewer::Advisor(advisor_id) => {
                let Some(id) = requested else {
                    return Ok(None);
                };
                match self.lookup(id)? {
                    Some(profile) if profile.role == Role::Client => {
                        Ok(Some(Subject::Selected(profile)))
                    }
                    Some(_) => {
                        debug!(advisor = advisor_id, requested = id, "requested account is not a client");
                        Ok(None)
                    }
                    None => {
                        debug!(advisor = advisor_id, requested = id, "requested client not found");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Clients the viewer may select from: every client for an advisor,
    /// nothing for anyone else.
    pub fn selectable_subjects(&self, viewer: &Viewer) -> Result<Vec<Profile>, IdentityError> {
        if !viewer.is_privileged() {
            return Ok(Vec::new());
        }
        let mut clients = self
            .directory
            .clients()
            .map_err(|e| IdentityError(Box::new(e)))?;
        clients.retain(|p| p.role == Role::Client);
        clients.sort_by_key(|p| p.id);
        Ok(clients)
    }

    /// Resolve subject, privilege, selectable clients and pre-fill at once.
    pub fn resolve(
        &self,
        viewer: &Viewer,
        requested: Option<UserId>,
    ) -> Result<Resolution, IdentityError> {
        let subject = self.resolve_subject(viewer, requested)?;
        let prefill = subject.as_ref().map(Subject::prefill).unwrap_or_default();
        Ok(Resolution {
            subject,
            privileged: self.is_privileged(viewer),
            selectable: self.selectable_subjects(viewer)?,
            prefill,
        })
    }

    fn lookup(&self, id: UserId) -> Result<Option<Profile>, IdentityError> {
        self.directory
            .profile(id)
            .map_err(|e| IdentityError(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::convert::Infallible;

    struct MemoryDirectory {
        users: BTreeMap<UserId, Profile>,
    }

    impl UserDirectory for MemoryDirectory {
        type Error = Infallible;

        fn profile(&self, id: UserId) -> Result<Option<Profile>, Infallible> {
            Ok(self.users.get(&id).cloned())
        }

        fn clients(&self) -> Result<Vec<Profile>, Infallible> {
            Ok(self
                .users
                .values()
                .filter(|p| p.role == Role::Client)
                .cloned()
                .collect())
        }
    }

    #[derive(Debug, Error)]
    #[error("directory offline")]
    struct Offline;

    struct OfflineDirectory;

    impl UserDirectory for OfflineDirectory {
        type Error = Offline;

        fn profile(&self, _id: UserId) -> Result<Option<Profile>, Offline> {
            Err(Offline)
        }

        fn clients(&self) -> Result<Vec<Profile>, Offline> {
            Err(Offline)
        }
    }

    fn marie() -> Profile {
        Profile {
            first_name: Some("Marie".into()),
            last_name: Some("Dupont".into()),
            age: Some(19),
            sex: Some(Sex::Female),
            weight_kg: Some(65.8),
            height_m: Some(1.75),
            children: Some(0),
            region: Some(Region::Southwest),
            smoker: Some(Smoker::Yes),
            ..Profile::new(1, Role::Client, "marie.dupont@gmail.com")
        }
    }

    fn directory() -> MemoryDirectory {
        let advisor = Profile::new(2, Role::Advisor, "advisor@test.fr");
        let jean = Profile {
            first_name: Some("Jean".into()),
            last_name: Some("Bernard".into()),
            ..Profile::new(3, Role::Client, "jbernard@hotmail.fr")
        };
        let users = [marie(), advisor, jean]
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        MemoryDirectory { users }
    }

    #[test]
    fn anonymous_ignores_requested_id() {
        let resolver = IdentityResolver::new(directory());
        let r = resolver.resolve(&Viewer::Anonymous, Some(1)).unwrap();
        assert_eq!(r.subject, None);
        assert!(!r.privileged);
        assert!(r.prefill.is_empty());
        assert!(r.selectable.is_empty());

        // Unknown ids are equally ignored.
        let r = resolver.resolve(&Viewer::Anonymous, Some(999)).unwrap();
        assert!(r.prefill.is_empty());
    }

    #[test]
    fn client_only_sees_own_profile() {
        let resolver = IdentityResolver::new(directory());
        let subject = resolver
            .resolve_subject(&Viewer::Client(1), Some(3))
            .unwrap()
            .unwrap();
        assert_eq!(subject, Subject::Own(marie()));
        assert!(!resolver.is_privileged(&Viewer::Client(1)));
    }

    #[test]
    fn client_prefill_has_all_present_fields() {
        let resolver = IdentityResolver::new(directory());
        let r = resolver.resolve(&Viewer::Client(1), None).unwrap();
        let expected = Prefill {
            first_name: Some("Marie".into()),
            last_name: Some("Dupont".into()),
            email: Some("marie.dupont@gmail.com".into()),
            age: Some(19),
            sex: Some(Sex::Female),
            weight_kg: Some(65.8),
            height_m: Some(1.75),
            children: Some(0),
            region: Some(Region::Southwest),
            smoker: Some(Smoker::Yes),
        };
        assert_eq!(r.prefill, expected);
        assert!(r.selectable.is_empty());
    }

    #[test]
    fn zero_children_is_kept_not_omitted() {
        let prefill = Subject::Own(marie()).prefill();
        assert_eq!(prefill.children, Some(0));
        assert!(prefill.fields().contains(&("children", "0".to_string())));

        let json = serde_json::to_value(&prefill).unwrap();
        assert_eq!(json["children"], 0);
    }

    #[test]
    fn absent_attributes_are_omitted() {
        let resolver = IdentityResolver::new(directory());
        let r = resolver.resolve(&Viewer::Client(3), None).unwrap();
        let fields: Vec<&str> = r.prefill.fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(fields, ["first_name", "last_name", "email"]);

        let json = serde_json::to_value(&r.prefill).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(!obj.contains_key("children"));
        assert!(!obj.contains_key("age"));
    }

    #[test]
    fn advisor_selects_existing_client() {
        let resolver = IdentityResolver::new(directory());
        let r = resolver.resolve(&Viewer::Advisor(2), Some(1)).unwrap();
        assert!(r.privileged);
        assert_eq!(r.subject, Some(Subject::Selected(marie())));
        assert_eq!(r.prefill.first_name.as_deref(), Some("Marie"));
    }

    #[test]
    fn advisor_unknown_id_resolves_to_none() {
        let resolver = IdentityResolver::new(directory());
        let r = resolver.resolve(&Viewer::Advisor(2), Some(5)).unwrap();
        assert_eq!(r.subject, None);
        assert!(r.privileged);
        assert!(r.prefill.is_empty());
    }

    #[test]
    fn advisor_cannot_select_another_advisor() {
        let resolver = IdentityResolver::new(directory());
        let subject = resolver
            .resolve_subject(&Viewer::Advisor(2), Some(2))
            .unwrap();
        assert_eq!(subject, None);
    }

    #[test]
    fn advisor_without_selection_has_empty_prefill() {
        let resolver = IdentityResolver::new(directory());
        let r = resolver.resolve(&Viewer::Advisor(2), None).unwrap();
        assert!(r.privileged);
        assert!(r.prefill.is_empty());
    }

    #[test]
    fn advisor_lists_only_clients() {
        let resolver = IdentityResolver::new(directory());
        let ids: Vec<UserId> = resolver
            .selectable_subjects(&Viewer::Advisor(2))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, [1, 3]);

        assert!(resolver.selectable_subjects(&Viewer::Client(1)).unwrap().is_empty());
        assert!(resolver.selectable_subjects(&Viewer::Anonymous).unwrap().is_empty());
    }

    #[test]
    fn directory_failure_propagates() {
        let resolver = IdentityResolver::new(OfflineDirectory);
        assert!(resolver.resolve_subject(&Viewer::Client(1), None).is_err());
        // Anonymous never touches the directory.
        assert!(resolver.resolve(&Viewer::Anonymous, Some(1)).is_ok());
    }

    #[test]
    fn resolver_accepts_borrowed_directory() {
        let dir = directory();
        let resolver = IdentityResolver::new(&dir);
        assert!(resolver.resolve_subject(&Viewer::Client(1), None).unwrap().is_some());
    }

    #[test]
    fn profile_bmi_needs_both_measurements() {
        assert_eq!(marie().bmi(), Some(21.49));
        assert_eq!(Profile::new(9, Role::Client, "x@y.z").bmi(), None);
        let zero_height = Profile {
            weight_kg: Some(70.0),
            height_m: Some(0.0),
            ..Profile::new(9, Role::Client, "x@y.z")
        };
        assert_eq!(zero_height.bmi(), None);
    }

    #[test]
    fn role_and_viewer_helpers() {
        assert_eq!("advisor".parse::<Role>().unwrap(), Role::Advisor);
        assert_eq!("Client".parse::<Role>().unwrap(), Role::Client);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(Viewer::authenticated(4, Role::Advisor), Viewer::Advisor(4));
        assert_eq!(Viewer::Anonymous.user_id(), None);
        assert_eq!(Viewer::Client(7).user_id(), Some(7));
    }

    #[test]
    fn full_name_skips_missing_parts() {
        assert_eq!(marie().full_name(), "Marie Dupont");
        assert_eq!(Profile::new(9, Role::Client, "x@y.z").full_name(), "");
    }
}
