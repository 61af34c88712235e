//! In-memory stores and fixtures shared by the unit tests.
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::access::{AccessContext, Role, UserProfile};
use crate::error::Result;
use crate::record::{
    derive_timestamp, Market, NewReading, ProductState, Shift, TemperatureReading, Temperatures,
};
use crate::store::{ReadingFilter, ReadingStore, UserStore};

#[derive(Default)]
pub struct MemoryStore {
    pub readings: Vec<TemperatureReading>,
    pub users: Vec<UserProfile>,
    next_id: i64,
}

impl ReadingStore for MemoryStore {
    fn insert_reading(&mut self, reading: &NewReading) -> Result<i64> {
        self.next_id += 1;
        self.readings.push(reading.clone().with_id(self.next_id));
        Ok(self.next_id)
    }

    fn fetch_readings(&mut self, filter: &ReadingFilter) -> Result<Vec<TemperatureReading>> {
        let mut readings: Vec<TemperatureReading> = self
            .readings
            .iter()
            .filter(|reading| filter.matches(reading))
            .cloned()
            .collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(readings)
    }

    fn delete_reading(&mut self, id: i64) -> Result<u64> {
        let before = self.readings.len();
        self.readings.retain(|reading| reading.id != id);
        Ok((before - self.readings.len()) as u64)
    }

    fn delete_matching(&mut self, filter: &ReadingFilter) -> Result<u64> {
        let before = self.readings.len();
        self.readings.retain(|reading| !filter.matches(reading));
        Ok((before - self.readings.len()) as u64)
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let before = self.readings.len();
        self.readings.retain(|reading| reading.timestamp >= cutoff);
        Ok((before - self.readings.len()) as u64)
    }

    fn delete_all(&mut self) -> Result<u64> {
        let before = self.readings.len();
        self.readings.clear();
        Ok(before as u64)
    }
}

impl UserStore for MemoryStore {
    fn list_users(&mut self) -> Result<Vec<UserProfile>> {
        Ok(self.users.clone())
    }

    fn find_user(&mut self, id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.iter().find(|user| user.id == id).cloned())
    }

    fn find_user_by_email(&mut self, email: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn create_user(&mut self, profile: &UserProfile) -> Result<()> {
        self.users.push(profile.clone());
        Ok(())
    }

    fn update_user(&mut self, id: &str, name: &str, permissions: &BTreeSet<String>) -> Result<u64> {
        match self.users.iter_mut().find(|user| user.id == id) {
            Some(user) => {
                user.name = name.to_string();
                user.permissions = permissions.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_user(&mut self, id: &str) -> Result<u64> {
        let before = self.users.len();
        self.users.retain(|user| user.id != id);
        Ok((before - self.users.len()) as u64)
    }
}

/// External-market frozen reading on the first shift.
pub fn new_reading(location: &str, date: &str, time: &str) -> NewReading {
    NewReading {
        shift: Shift::First,
        location: location.to_string(),
        product_code: Some("CX10".to_string()),
        product_name: "Chicken breast".to_string(),
        market: Market::External,
        state: ProductState::Frozen,
        measured_at_date: date.to_string(),
        measured_at_time: time.to_string(),
        temperatures: Temperatures::new(-19.0, -19.5, -20.0),
        recorded_by: "user-1".to_string(),
        timestamp: derive_timestamp(date, time).unwrap(),
    }
}

fn profile(role: Role, permissions: &[&str]) -> UserProfile {
    UserProfile {
        id: format!("{}-id", role),
        name: format!("Test {}", role),
        email: format!("{}@plant.example", role),
        employee_number: "0001".to_string(),
        role,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

pub fn admin_context() -> AccessContext {
    AccessContext::new(profile(Role::Admin, &[]))
}

pub fn user_context(permissions: &[&str]) -> AccessContext {
    AccessContext::new(profile(Role::User, permissions))
}
