//! Module for connecting to a postgres database, storing the readings received from the intake
//! socket and serving the queries of the command line operations.
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time;

use chrono::{DateTime, Utc};
use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use postgres::types::ToSql;
use postgres::{Client, Row};
use postgres_openssl::MakeTlsConnector;
use serde::{Deserialize, Serialize};

use crate::access::UserProfile;
use crate::error::{Error, Result};
use crate::record::{NewReading, TemperatureReading, Temperatures};
use crate::store::{ReadingFilter, ReadingStore, UserStore};

static SQL_CREATE_DATABASE: &'static str = include_str!("sql/create_database.sql");

static SQL_INSERT_READING: &'static str = include_str!("sql/insert_reading.sql");
static SQL_SELECT_READINGS: &'static str = include_str!("sql/select_readings.sql");
static SQL_DELETE_READING: &'static str = include_str!("sql/delete_reading.sql");
static SQL_DELETE_MATCHING: &'static str = include_str!("sql/delete_matching.sql");
static SQL_DELETE_OLDER_THAN: &'static str = include_str!("sql/delete_older_than.sql");
static SQL_DELETE_ALL: &'static str = include_str!("sql/delete_all.sql");

static SQL_SELECT_USERS: &'static str = include_str!("sql/select_users.sql");
static SQL_SELECT_USER_BY_ID: &'static str = include_str!("sql/select_user_by_id.sql");
static SQL_SELECT_USER_BY_EMAIL: &'static str = include_str!("sql/select_user_by_email.sql");
static SQL_INSERT_USER: &'static str = include_str!("sql/insert_user.sql");
static SQL_UPDATE_USER: &'static str = include_str!("sql/update_user.sql");
static SQL_DELETE_USER: &'static str = include_str!("sql/delete_user.sql");

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Struct modeling the parameters required for a database connection.
///
/// This includes SSL/TLS encryption.
pub struct DatabaseParameters
{
    /// The hostname of the database server.
    pub hostname: String,
    /// The port for the database server.
    pub port: u16,
    /// The username to connect as.
    pub username: String,
    /// The password to connect with.
    pub password: String,
    /// The database to open on the server.
    pub database: String,
    /// Flag to enable tls for the database server connection.
    pub tls_enable: bool,
    /// Parameters for the tls connection to the database server.
    pub tls_params: Option<DatabaseTlsParameters>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Struct for the parameters required for a tls connection to the database.
pub struct DatabaseTlsParameters {
    /// The path to the server certificate for TLS encryption.
    pub server_ca_path: String,
    /// The path to the client certificate for TLS encryption.
    pub client_cert_path: String,
    /// The path to the client key for TLS encryption.
    pub client_key_path: String,
    /// Verify the server certificate against the CA.
    #[serde(default)]
    pub verify_server: bool,
}

fn tls_connector(tls_params: &DatabaseTlsParameters) -> Result<MakeTlsConnector> {
    let mut ssl_connection_builder = SslConnector::builder(SslMethod::tls())?;

    if tls_params.verify_server {
        ssl_connection_builder.set_verify(SslVerifyMode::PEER);
    } else {
        ssl_connection_builder.set_verify(SslVerifyMode::NONE);
    }
    ssl_connection_builder.set_ca_file(&tls_params.server_ca_path)?;
    ssl_connection_builder.set_certificate_file(&tls_params.client_cert_path, SslFiletype::PEM)?;
    ssl_connection_builder.set_private_key_file(&tls_params.client_key_path, SslFiletype::PEM)?;

    Ok(MakeTlsConnector::new(ssl_connection_builder.build()))
}

/// Opens a client connection with the given parameters.
///
/// # Errors
///
/// * `Error::InvalidArgument` - TLS is enabled but no TLS parameters are configured.
/// * `Error::Tls` - The files for the TLS connection cannot be loaded.
/// * `Error::Database` - The connection cannot be established or the user is not authorized.
pub fn connect_client(connection_parameters: &DatabaseParameters) -> Result<Client> {
    let mut postgres_config = postgres::Config::new();
    postgres_config
        .user(&connection_parameters.username)
        .password(&connection_parameters.password)
        .host(&connection_parameters.hostname)
        .port(connection_parameters.port)
        .dbname(&connection_parameters.database)
        .application_name("qclogd");

    if connection_parameters.tls_enable {
        let tls_params = connection_parameters.tls_params.as_ref().ok_or_else(|| {
            Error::InvalidArgument("TLS enabled but no TLS parameters specified".to_string())
        })?;
        Ok(postgres_config.connect(tls_connector(tls_params)?)?)
    } else {
        Ok(postgres_config.connect(postgres::NoTls)?)
    }
}

fn reading_from_row(row: &Row) -> Result<TemperatureReading> {
    let shift: String = row.try_get("shift")?;
    let market: String = row.try_get("market")?;
    let state: String = row.try_get("state")?;
    let timestamp: DateTime<Utc> = row.try_get("measured_at")?;

    Ok(TemperatureReading {
        id: row.try_get("id")?,
        shift: shift.parse()?,
        location: row.try_get("location")?,
        product_code: row.try_get("product_code")?,
        product_name: row.try_get("product_name")?,
        market: market.parse()?,
        state: state.parse()?,
        measured_at_date: row.try_get("measured_at_date")?,
        measured_at_time: row.try_get("measured_at_time")?,
        temperatures: Temperatures::new(
            row.try_get("temperature_start")?,
            row.try_get("temperature_middle")?,
            row.try_get("temperature_end")?,
        ),
        recorded_by: row.try_get("recorded_by")?,
        timestamp,
    })
}

fn user_from_row(row: &Row) -> Result<UserProfile> {
    let role: String = row.try_get("role")?;
    let permissions: Vec<String> = row.try_get("permissions")?;

    Ok(UserProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        employee_number: row.try_get("employee_number")?,
        role: role.parse()?,
        permissions: permissions.into_iter().collect(),
    })
}

/// Reading and profile store backed by a postgres database.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connects to the database and creates the tables if they do not exist yet.
    pub fn connect(connection_parameters: &DatabaseParameters) -> Result<PostgresStore> {
        let mut client = connect_client(connection_parameters)?;
        client.batch_execute(SQL_CREATE_DATABASE)?;
        log::info!(target: "qclogd::db", "Database connection established!");
        Ok(PostgresStore { client })
    }
}

/// Owned query parameters for the statements filtering by a `ReadingFilter`.
struct FilterParams {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: Option<String>,
    shift: Option<&'static str>,
    market: Option<&'static str>,
    product_code: Option<String>,
    state: Option<&'static str>,
}

impl FilterParams {
    fn new(filter: &ReadingFilter) -> Self {
        FilterParams {
            start: filter.start,
            end: filter.end,
            location: filter.location.clone(),
            shift: filter.shift.map(|shift| shift.as_str()),
            market: filter.market.map(|market| market.as_str()),
            product_code: filter.product_code.clone(),
            state: filter.state.map(|state| state.as_str()),
        }
    }

    fn as_params(&self) -> [&(dyn ToSql + Sync); 7] {
        [
            &self.start,
            &self.end,
            &self.location,
            &self.shift,
            &self.market,
            &self.product_code,
            &self.state,
        ]
    }
}

impl ReadingStore for PostgresStore {
    fn insert_reading(&mut self, reading: &NewReading) -> Result<i64> {
        let row = self.client.query_one(
            SQL_INSERT_READING,
            &[
                &reading.shift.as_str(),
                &reading.location,
                &reading.product_code,
                &reading.product_name,
                &reading.market.as_str(),
                &reading.state.as_str(),
                &reading.measured_at_date,
                &reading.measured_at_time,
                &reading.temperatures.start,
                &reading.temperatures.middle,
                &reading.temperatures.end,
                &reading.recorded_by,
                &reading.timestamp,
            ],
        )?;
        Ok(row.try_get("id")?)
    }

    fn fetch_readings(&mut self, filter: &ReadingFilter) -> Result<Vec<TemperatureReading>> {
        let params = FilterParams::new(filter);
        let rows = self.client.query(SQL_SELECT_READINGS, &params.as_params())?;
        log::debug!(target: "qclogd::db", "Fetched {} reading(s)", rows.len());
        rows.iter().map(reading_from_row).collect()
    }

    fn delete_reading(&mut self, id: i64) -> Result<u64> {
        Ok(self.client.execute(SQL_DELETE_READING, &[&id])?)
    }

    fn delete_matching(&mut self, filter: &ReadingFilter) -> Result<u64> {
        let params = FilterParams::new(filter);
        Ok(self.client.execute(SQL_DELETE_MATCHING, &params.as_params())?)
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self.client.execute(SQL_DELETE_OLDER_THAN, &[&cutoff])?)
    }

    fn delete_all(&mut self) -> Result<u64> {
        Ok(self.client.execute(SQL_DELETE_ALL, &[])?)
    }
}

impl UserStore for PostgresStore {
    fn list_users(&mut self) -> Result<Vec<UserProfile>> {
        let rows = self.client.query(SQL_SELECT_USERS, &[])?;
        rows.iter().map(user_from_row).collect()
    }

    fn find_user(&mut self, id: &str) -> Result<Option<UserProfile>> {
        match self.client.query_opt(SQL_SELECT_USER_BY_ID, &[&id])? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    fn find_user_by_email(&mut self, email: &str) -> Result<Option<UserProfile>> {
        match self.client.query_opt(SQL_SELECT_USER_BY_EMAIL, &[&email])? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    fn create_user(&mut self, profile: &UserProfile) -> Result<()> {
        let permissions: Vec<&str> = profile.permissions.iter().map(String::as_str).collect();
        self.client.execute(
            SQL_INSERT_USER,
            &[
                &profile.id,
                &profile.name,
                &profile.email,
                &profile.employee_number,
                &profile.role.as_str(),
                &permissions,
            ],
        )?;
        Ok(())
    }

    fn update_user(&mut self, id: &str, name: &str, permissions: &BTreeSet<String>) -> Result<u64> {
        let permissions: Vec<&str> = permissions.iter().map(String::as_str).collect();
        Ok(self.client.execute(SQL_UPDATE_USER, &[&id, &name, &permissions])?)
    }

    fn delete_user(&mut self, id: &str) -> Result<u64> {
        Ok(self.client.execute(SQL_DELETE_USER, &[&id])?)
    }
}

/// Thread function for the database connection.
///
/// This thread establishes a database connection and moves all readings in the receive channel
/// to the database.
///
/// This function will run until the `thread_finish` parameter was set or the connection fails.
///
/// # Arguments
///
/// * `rx` - The channel to receive the readings to insert from.
///
/// * `thread_finish` - Indicates that the thread should finish operation and should return.
///
/// * `connection_parameters` - Parameters for the database connection.
///
/// # Errors
///
/// Errors occur when one of the following conditions is met:
///
/// * The files for the TLS connection cannot be found.
///
/// * The connection cannot be established.
///
/// * The the user is not authorized for the database.
///
/// These errors set `thread_finish` and make the method return immediately.
///
pub fn database_thread(rx: Receiver<NewReading>, thread_finish: Arc<AtomicBool>, connection_parameters: DatabaseParameters)
{
    let mut store = match PostgresStore::connect(&connection_parameters) {
        Ok(store) => store,
        Err(err) => {
            log::error!(target: "qclogd::db", "Could not establish database connection: \'{}\'", err);
            thread_finish.store(true, Ordering::SeqCst);
            return;
        }
    };

    let timeout = time::Duration::from_millis(100);

    while !thread_finish.load(Ordering::SeqCst) {
        let reading = match rx.recv_timeout(timeout) {
            Ok(reading) => reading,
            Err(_) => {
                continue;
            }
        };

        match store.insert_reading(&reading) {
            Ok(id) => log::debug!(target: "qclogd::db", "Inserted reading {} from \'{}\'", id, reading.recorded_by),
            Err(err) => {
                log::error!(target: "qclogd::db", "Database insert failed: \'{}\'", err);
                continue;
            }
        }
    }
}
