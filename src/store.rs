//! Collaborator traits for the record and profile stores, and the authorized operations on top
//! of them.
use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::access::{all_permissions, validate_permissions, AccessContext, Capability, Role, UserProfile};
use crate::error::{Error, Result};
use crate::record::{Market, NewReading, ProductState, Shift, TemperatureReading};

#[derive(Serialize, Debug, Clone, PartialEq)]
/// Range and exact-match restrictions for reading queries.
pub struct ReadingFilter {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub shift: Option<Shift>,
    pub market: Option<Market>,
    pub product_code: Option<String>,
    pub state: Option<ProductState>,
}

fn local_instant(day: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>> {
    match Local.from_local_datetime(&day.and_time(time)).earliest() {
        Some(instant) => Ok(DateTime::<Utc>::from(instant)),
        None => Err(Error::InvalidArgument(format!(
            "{} {} does not exist in the local timezone",
            day, time
        ))),
    }
}

impl ReadingFilter {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        ReadingFilter {
            start,
            end,
            location: None,
            shift: None,
            market: None,
            product_code: None,
            state: None,
        }
    }

    /// Range covering the local calendar days `from` to `to`, both complete.
    pub fn for_days(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to < from {
            return Err(Error::InvalidArgument(format!(
                "end day {} is before start day {}",
                to, from
            )));
        }
        let start_of_day = NaiveTime::from_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidArgument("invalid start of day".to_string()))?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
            .ok_or_else(|| Error::InvalidArgument("invalid end of day".to_string()))?;
        let start = local_instant(from, start_of_day)?;
        let end = local_instant(to, end_of_day)?;
        Ok(ReadingFilter::new(start, end))
    }

    /// Evaluates the filter against a reading held in memory.
    pub fn matches(&self, reading: &TemperatureReading) -> bool {
        if reading.timestamp < self.start || reading.timestamp > self.end {
            return false;
        }
        if let Some(location) = &self.location {
            if reading.location.as_deref() != Some(location.as_str()) {
                return false;
            }
        }
        if let Some(code) = &self.product_code {
            // A missing code matches the `N/A` placeholder.
            if reading.product_code_or_placeholder() != code.as_str() {
                return false;
            }
        }
        self.shift.map_or(true, |shift| reading.shift == shift)
            && self.market.map_or(true, |market| reading.market == market)
            && self.state.map_or(true, |state| reading.state == state)
    }
}

/// Persistence of temperature readings.
pub trait ReadingStore {
    /// Stores a reading and returns the id assigned to it.
    fn insert_reading(&mut self, reading: &NewReading) -> Result<i64>;

    /// Readings matching `filter`, newest first.
    fn fetch_readings(&mut self, filter: &ReadingFilter) -> Result<Vec<TemperatureReading>>;

    /// Deletes one reading, returning the number of deleted records (0 or 1).
    fn delete_reading(&mut self, id: i64) -> Result<u64>;

    fn delete_matching(&mut self, filter: &ReadingFilter) -> Result<u64>;

    /// Deletes readings with a timestamp strictly before `cutoff`.
    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<u64>;

    fn delete_all(&mut self) -> Result<u64>;
}

/// Persistence of user profiles.
pub trait UserStore {
    fn list_users(&mut self) -> Result<Vec<UserProfile>>;

    fn find_user(&mut self, id: &str) -> Result<Option<UserProfile>>;

    fn find_user_by_email(&mut self, email: &str) -> Result<Option<UserProfile>>;

    fn create_user(&mut self, profile: &UserProfile) -> Result<()>;

    /// Updates name and permissions, returning the number of updated profiles.
    fn update_user(&mut self, id: &str, name: &str, permissions: &BTreeSet<String>) -> Result<u64>;

    fn delete_user(&mut self, id: &str) -> Result<u64>;
}

/// Records a reading on behalf of the actor.
pub fn record_reading<S: ReadingStore>(store: &mut S, context: &AccessContext, reading: &NewReading) -> Result<i64> {
    context.require(Capability::RecordReadings)?;
    let id = store.insert_reading(reading)?;
    log::info!(target: "qclogd", "Reading {} recorded by '{}'", id, context.actor().email);
    Ok(id)
}

/// Deletes a single reading.
///
/// # Errors
///
/// * `Error::Forbidden` - The actor may not delete records.
/// * `Error::NotFound` - No reading with this id exists.
pub fn delete_reading<S: ReadingStore>(store: &mut S, context: &AccessContext, id: i64) -> Result<u64> {
    context.require(Capability::DeleteRecords)?;
    let deleted = store.delete_reading(id)?;
    if deleted == 0 {
        return Err(Error::not_found("Reading", &id.to_string()));
    }
    log::info!(target: "qclogd", "Reading {} deleted by '{}'", id, context.actor().email);
    Ok(deleted)
}

/// Deletes every reading matched by `filter`.
pub fn delete_matching<S: ReadingStore>(store: &mut S, context: &AccessContext, filter: &ReadingFilter) -> Result<u64> {
    context.require(Capability::DeleteRecords)?;
    let deleted = store.delete_matching(filter)?;
    log::info!(target: "qclogd", "{} reading(s) deleted by '{}' using a filter", deleted, context.actor().email);
    Ok(deleted)
}

/// Start of the retained period: readings before this instant are swept.
///
/// # Errors
///
/// * `Error::InvalidArgument` - The period reaches before the earliest representable instant.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(Duration::days(i64::from(retention_days)))
        .ok_or_else(|| {
            Error::InvalidArgument(format!("a retention period of {} days is out of range", retention_days))
        })
}

/// Deletes readings older than `retention_days`.
pub fn retention_sweep<S: ReadingStore>(
    store: &mut S,
    context: &AccessContext,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<u64> {
    context.require(Capability::ManageSettings)?;
    let cutoff = retention_cutoff(now, retention_days)?;
    let deleted = store.delete_older_than(cutoff)?;
    log::info!(target: "qclogd", "Retention sweep removed {} reading(s) before {}", deleted, cutoff);
    Ok(deleted)
}

/// Deletes all readings.
pub fn reset_readings<S: ReadingStore>(store: &mut S, context: &AccessContext) -> Result<u64> {
    context.require(Capability::ManageSettings)?;
    let deleted = store.delete_all()?;
    log::warn!(target: "qclogd", "Reset by '{}' removed {} reading(s)", context.actor().email, deleted);
    Ok(deleted)
}

/// Profiles of all non-admin users.
pub fn list_operators<S: UserStore>(store: &mut S, context: &AccessContext) -> Result<Vec<UserProfile>> {
    context.require(Capability::ManageUsers)?;
    Ok(store
        .list_users()?
        .into_iter()
        .filter(|profile| profile.role != Role::Admin)
        .collect())
}

/// Creates a profile for a user the identity provider already knows.
pub fn create_user<S: UserStore>(store: &mut S, context: &AccessContext, profile: UserProfile) -> Result<UserProfile> {
    context.require(Capability::ManageUsers)?;
    if profile.id.trim().is_empty() {
        return Err(Error::validation("id", "is mandatory"));
    }
    if profile.name.trim().is_empty() {
        return Err(Error::validation("name", "is mandatory"));
    }
    if !profile.email.contains('@') {
        return Err(Error::validation("email", "is not an email address"));
    }
    let profile = UserProfile {
        permissions: validate_permissions(&profile.permissions)?,
        ..profile
    };
    if store.find_user(&profile.id)?.is_some() || store.find_user_by_email(&profile.email)?.is_some() {
        return Err(Error::InvalidArgument(format!("a profile for '{}' already exists", profile.email)));
    }
    store.create_user(&profile)?;
    log::info!(target: "qclogd", "User '{}' created by '{}'", profile.email, context.actor().email);
    Ok(profile)
}

/// Changes name and permissions of a profile.
pub fn update_user<S: UserStore>(
    store: &mut S,
    context: &AccessContext,
    id: &str,
    name: &str,
    permissions: &[String],
) -> Result<()> {
    context.require(Capability::ManageUsers)?;
    if name.trim().is_empty() {
        return Err(Error::validation("name", "is mandatory"));
    }
    let permissions = validate_permissions(permissions)?;
    if store.update_user(id, name.trim(), &permissions)? == 0 {
        return Err(Error::not_found("User", id));
    }
    log::info!(target: "qclogd", "User '{}' updated by '{}'", id, context.actor().email);
    Ok(())
}

pub fn delete_user<S: UserStore>(store: &mut S, context: &AccessContext, id: &str) -> Result<()> {
    context.require(Capability::ManageUsers)?;
    if context.actor().id == id {
        return Err(Error::InvalidArgument("users cannot delete their own profile".to_string()));
    }
    if store.delete_user(id)? == 0 {
        return Err(Error::not_found("User", id));
    }
    log::info!(target: "qclogd", "User '{}' deleted by '{}'", id, context.actor().email);
    Ok(())
}

/// Resolves the acting user by email.
///
/// The first use of `bootstrap_admin_email` creates the administrator profile.
pub fn resolve_actor<S: UserStore>(store: &mut S, email: &str, bootstrap_admin_email: Option<&str>) -> Result<AccessContext> {
    let email = email.trim();
    if let Some(profile) = store.find_user_by_email(email)? {
        return Ok(AccessContext::new(profile));
    }

    match bootstrap_admin_email {
        Some(admin_email) if admin_email.eq_ignore_ascii_case(email) => {
            let profile = UserProfile {
                id: email.to_lowercase(),
                name: "Administrator".to_string(),
                email: email.to_string(),
                employee_number: "admin".to_string(),
                role: Role::Admin,
                permissions: all_permissions(),
            };
            store.create_user(&profile)?;
            log::info!(target: "qclogd", "Created bootstrap administrator profile for '{}'", email);
            Ok(AccessContext::new(profile))
        }
        _ => Err(Error::UnknownActor(email.to_string())),
    }
}
