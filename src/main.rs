use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use chrono::{Datelike, Local, NaiveDate, Utc};
use clap::{App, ArgMatches};

use qclogd::access::{AccessContext, Capability, Role, UserProfile};
use qclogd::config::{Configuration, DEFAULT_CONFIG_PATH};
use qclogd::database::{self, PostgresStore};
use qclogd::error::{Error, Result};
use qclogd::record::{NewReading, ReadingSubmission, TemperatureReading, NO_PRODUCT_CODE};
use qclogd::report::{self, Direction, GroupKey, GroupRow, Metric};
use qclogd::store::{self, ReadingFilter, ReadingStore, UserStore};
use qclogd::{export, socket};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Table,
    Json,
    Csv,
}

impl Format {
    fn parse(value: Option<&str>) -> Result<Format> {
        match value.unwrap_or("table") {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            other => Err(Error::InvalidArgument(format!("unknown output format '{}'", other))),
        }
    }
}

/// Arguments of one command, falling back to the top level for the global ones.
struct Invocation<'m> {
    global: &'m ArgMatches<'m>,
    command: &'m ArgMatches<'m>,
}

impl<'m> Invocation<'m> {
    fn value(&self, name: &str) -> Option<&'m str> {
        if self.command.occurrences_of(name) > 0 {
            return self.command.value_of(name);
        }
        if self.global.occurrences_of(name) > 0 {
            return self.global.value_of(name);
        }
        self.command.value_of(name).or_else(|| self.global.value_of(name))
    }

    fn format(&self) -> Result<Format> {
        Format::parse(self.value("format"))
    }

    fn output(&self) -> Result<Box<dyn Write>> {
        match self.value("output") {
            Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
            None => Ok(Box::new(io::stdout())),
        }
    }

    fn parsed<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.value(name) {
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|err| Error::InvalidArgument(format!("--{} '{}': {}", name, value, err))),
            None => Ok(None),
        }
    }
}

fn main() {
    let cli_yaml = clap::load_yaml!("cli.yml");
    let matches = App::from(cli_yaml).get_matches();

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let configuration = match Configuration::from_file(config_path) {
        Ok(configuration) => configuration,
        Err(err) => {
            eprintln!("Cannot load the configuration from \'{}\': {}", config_path, err);
            exit(100);
        }
    };

    let log_config_path = matches
        .value_of("log-config")
        .unwrap_or(&configuration.log_config_path);
    match log4rs::init_file(log_config_path, Default::default()) {
        Ok(_) => {}
        Err(err) => {
            eprintln!("Could not create logger from yaml configuration: {}", err);
            exit(-100);
        }
    };

    match matches.subcommand() {
        ("serve", _) => exit(serve(&configuration)),
        (name, Some(command)) => {
            let invocation = Invocation {
                global: &matches,
                command,
            };
            match run(name, &invocation, &configuration) {
                Ok(_) => exit(0),
                Err(err) => {
                    log::error!(target: "qclogd", "{} failed: {}", name, err);
                    eprintln!("{}", err);
                    exit(exit_code(&err));
                }
            }
        }
        _ => {
            eprintln!("{}", matches.usage());
            exit(2);
        }
    }
}

fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Validation { .. } | Error::InvalidArgument(_) => 2,
        Error::Forbidden(_) | Error::UnknownActor(_) => 3,
        Error::NotFound { .. } => 4,
        _ => 1,
    }
}

/// Runs the intake daemon until a termination signal arrives or a worker gives up.
fn serve(configuration: &Configuration) -> i32 {
    let (tx, rx): (Sender<NewReading>, Receiver<NewReading>) = mpsc::channel();

    let terminate_programm = Arc::new(AtomicBool::new(false));
    let terminate_main_thread = Arc::clone(&terminate_programm);
    let terminate_socket_thread = Arc::clone(&terminate_programm);
    let terminate_database_thread = Arc::clone(&terminate_programm);

    let socket_configuration = configuration.socket_connection_parameters.clone();
    let catalog = configuration.product_catalog.clone();
    let socket_thread = match thread::Builder::new()
        .name("socket".to_string())
        .spawn(move || {
            socket::socket_thread(tx, terminate_socket_thread, socket_configuration, catalog);
        }) {
        Ok(socket_handle) => socket_handle,
        Err(err) => {
            log::error!(target: "qclogd", "Cannot start the udp socket thread: \'{}\'", err);
            return 201;
        }
    };

    let database_configuration = configuration.database_connection_parameters.clone();
    let database_thread = match thread::Builder::new()
        .name("database".to_string())
        .spawn(move || {
            database::database_thread(rx, terminate_database_thread, database_configuration);
        }) {
        Ok(database_handle) => database_handle,
        Err(err) => {
            log::error!(target: "qclogd", "Cannot start the database thread: \'{}\'", err);
            terminate_programm.store(true, Ordering::SeqCst);
            return 202;
        }
    };

    if let Err(err) = ctrlc::set_handler(move || {
        log::info!(target: "qclogd", "Termination signal received!");
        terminate_main_thread.store(true, Ordering::SeqCst);
    }) {
        log::error!(target: "qclogd", "Cannot install the termination handler: \'{}\'", err);
        terminate_programm.store(true, Ordering::SeqCst);
    }

    match socket_thread.join() {
        Ok(_) => log::debug!(target: "qclogd", "Joined socket thread!"),
        Err(_) => {
            log::error!(target: "qclogd", "Could not join the socket thread!");
            return 301;
        }
    };
    match database_thread.join() {
        Ok(_) => log::debug!(target: "qclogd", "Joined database thread!"),
        Err(_) => {
            log::error!(target: "qclogd", "Could not join the database thread!");
            return 301;
        }
    };

    log::info!(target: "qclogd", "Exiting");
    0
}

fn run(name: &str, invocation: &Invocation<'_>, configuration: &Configuration) -> Result<()> {
    let mut store = PostgresStore::connect(&configuration.database_connection_parameters)?;
    let email = invocation
        .value("actor")
        .ok_or_else(|| Error::InvalidArgument("--actor is required".to_string()))?;
    let context = store::resolve_actor(&mut store, email, configuration.bootstrap_admin_email.as_deref())?;
    log::debug!(target: "qclogd", "Running '{}' for '{}'", name, context.actor().email);

    match name {
        "record" => record(&mut store, &context, invocation, configuration),
        "readings" => readings(&mut store, &context, invocation),
        "report" => group_report(&mut store, &context, invocation, configuration),
        "dashboard" => dashboard(&mut store, &context, invocation),
        "alerts" => alerts(&mut store, &context, invocation, configuration),
        "activity" => activity(&mut store, &context, invocation),
        "timeline" => timeline(&mut store, &context, invocation),
        "delete" => {
            let id = invocation
                .parsed::<i64>("id")?
                .ok_or_else(|| Error::InvalidArgument("reading id is required".to_string()))?;
            store::delete_reading(&mut store, &context, id)?;
            println!("Deleted reading {}", id);
            Ok(())
        }
        "delete-matching" => {
            confirmed(invocation, "delete-matching")?;
            let filter = period_filter(invocation)?;
            let deleted = store::delete_matching(&mut store, &context, &filter)?;
            println!("Deleted {} reading(s)", deleted);
            Ok(())
        }
        "sweep" => {
            let days = invocation
                .parsed::<u32>("days")?
                .unwrap_or(configuration.retention_days);
            let deleted = store::retention_sweep(&mut store, &context, days, Utc::now())?;
            println!("Deleted {} reading(s) older than {} day(s)", deleted, days);
            Ok(())
        }
        "reset" => {
            confirmed(invocation, "reset")?;
            let deleted = store::reset_readings(&mut store, &context)?;
            println!("Deleted {} reading(s)", deleted);
            Ok(())
        }
        "users" => users(&mut store, &context, invocation),
        other => Err(Error::InvalidArgument(format!("unknown command '{}'", other))),
    }
}

fn confirmed(invocation: &Invocation<'_>, command: &str) -> Result<()> {
    if invocation.command.is_present("yes") {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("{} deletes readings, confirm with --yes", command)))
    }
}

fn parse_day(name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| Error::InvalidArgument(format!("--{} '{}': {}", name, value, err)))
}

/// Period and filters of the query; the current month up to today unless given.
fn period_filter(invocation: &Invocation<'_>) -> Result<ReadingFilter> {
    let today = Local::now().date_naive();
    let from = match invocation.value("from") {
        Some(value) => parse_day("from", value)?,
        None => today.with_day(1).unwrap_or(today),
    };
    let to = match invocation.value("to") {
        Some(value) => parse_day("to", value)?,
        None => today,
    };

    let mut filter = ReadingFilter::for_days(from, to)?;
    filter.location = invocation
        .value("location")
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .map(str::to_string);
    filter.shift = invocation.parsed("shift")?;
    filter.market = invocation.parsed("market")?;
    filter.state = invocation.parsed("state")?;
    filter.product_code = invocation
        .value("product-code")
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty());
    Ok(filter)
}

fn fetch<S: ReadingStore>(store: &mut S, invocation: &Invocation<'_>) -> Result<Vec<TemperatureReading>> {
    let filter = period_filter(invocation)?;
    let readings = store.fetch_readings(&filter)?;
    log::debug!(
        target: "qclogd::report",
        "Fetched {} reading(s) between {} and {}",
        readings.len(),
        filter.start,
        filter.end
    );
    Ok(readings)
}

fn reading_line(reading: &TemperatureReading) -> String {
    format!(
        "{:>6} {} {:<8} {} {:<16} {:<8} {:<24} {:<8} {:<7} {:>6.1} {:>6.1} {:>6.1} {}",
        reading.id,
        reading.measured_at_date,
        reading.measured_at_time,
        reading.shift,
        reading.location.as_deref().unwrap_or(""),
        reading.product_code.as_deref().unwrap_or(NO_PRODUCT_CODE),
        reading.product_name.as_deref().unwrap_or(""),
        reading.market,
        reading.state,
        reading.temperatures.start,
        reading.temperatures.middle,
        reading.temperatures.end,
        reading.recorded_by
    )
}

fn write_reading_table(out: &mut dyn Write, readings: &[&TemperatureReading]) -> Result<()> {
    for reading in readings {
        writeln!(out, "{}", reading_line(reading))?;
    }
    writeln!(out, "{} reading(s)", readings.len())?;
    Ok(())
}

fn write_group_table(out: &mut dyn Write, rows: &[GroupRow]) -> Result<()> {
    writeln!(
        out,
        "{:<32} {:>6} {:>8} {:>8} {:>8} {:>8}",
        "key", "count", "average", "start", "middle", "end"
    )?;
    for row in rows {
        writeln!(out, "{}", row)?;
    }
    Ok(())
}

fn no_csv(command: &str) -> Error {
    Error::InvalidArgument(format!("{} has no csv output", command))
}

fn record<S: ReadingStore>(
    store: &mut S,
    context: &AccessContext,
    invocation: &Invocation<'_>,
    configuration: &Configuration,
) -> Result<()> {
    let mut payload = String::new();
    match invocation.command.value_of("input") {
        Some(path) => File::open(path)?.read_to_string(&mut payload)?,
        None => io::stdin().read_to_string(&mut payload)?,
    };

    let mut submission = serde_json::from_str::<ReadingSubmission>(&payload)?;
    submission.recorded_by = Some(context.actor().id.clone());
    let reading = submission.validate(&configuration.product_catalog)?;
    let id = store::record_reading(store, context, &reading)?;
    println!("Recorded reading {}", id);
    Ok(())
}

fn readings<S: ReadingStore>(store: &mut S, context: &AccessContext, invocation: &Invocation<'_>) -> Result<()> {
    context.require(Capability::ViewReadings)?;
    let format = invocation.format()?;
    let readings = fetch(store, invocation)?;
    let mut out = invocation.output()?;
    match format {
        Format::Table => {
            let rows: Vec<&TemperatureReading> = readings.iter().collect();
            write_reading_table(&mut out, &rows)?;
        }
        Format::Json => serde_json::to_writer_pretty(&mut out, &readings)?,
        Format::Csv => export::write_readings(&mut out, &readings)?,
    }
    out.flush()?;
    Ok(())
}

fn group_report<S: ReadingStore>(
    store: &mut S,
    context: &AccessContext,
    invocation: &Invocation<'_>,
    configuration: &Configuration,
) -> Result<()> {
    context.require(Capability::ViewCharts)?;
    let format = invocation.format()?;
    let key = invocation.parsed::<GroupKey>("by")?.unwrap_or(GroupKey::Product);
    let metric = invocation.parsed::<Metric>("metric")?.unwrap_or(Metric::Combined);
    let direction = invocation.parsed::<Direction>("order")?.unwrap_or(Direction::Descending);

    let readings = fetch(store, invocation)?;
    let mut rows = report::group_by(&readings, key);
    if let Some(n) = invocation.parsed::<usize>("top")? {
        rows = report::top_n(&rows, n, metric, direction);
    }
    log::info!(
        target: "qclogd::report",
        "Grouped {} reading(s) into {} row(s) by {:?}",
        readings.len(),
        rows.len(),
        key
    );

    let pages: Vec<&[GroupRow]> = report::chunk_rows(&rows, configuration.chart_page_size).collect();
    let selected: Vec<&[GroupRow]> = match invocation.parsed::<usize>("page")? {
        Some(page) if page >= 1 && page <= pages.len() => vec![pages[page - 1]],
        Some(page) if page == 1 && pages.is_empty() => Vec::new(),
        Some(page) => {
            return Err(Error::InvalidArgument(format!(
                "page {} does not exist, the report has {} page(s)",
                page,
                pages.len()
            )))
        }
        None => pages.clone(),
    };

    let mut out = invocation.output()?;
    match format {
        Format::Table => {
            for (index, page) in selected.iter().enumerate() {
                if pages.len() > 1 {
                    writeln!(out, "-- page {}/{} --", index + 1, pages.len())?;
                }
                write_group_table(&mut out, page)?;
            }
        }
        Format::Json => {
            let rows: Vec<&GroupRow> = selected.iter().flat_map(|page| page.iter()).collect();
            serde_json::to_writer_pretty(&mut out, &rows)?;
        }
        Format::Csv => {
            let rows: Vec<GroupRow> = selected.iter().flat_map(|page| page.iter().cloned()).collect();
            export::write_group_rows(&mut out, &rows)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn dashboard<S: ReadingStore>(store: &mut S, context: &AccessContext, invocation: &Invocation<'_>) -> Result<()> {
    context.require(Capability::ViewDashboard)?;
    let format = invocation.format()?;
    let readings = fetch(store, invocation)?;
    let summary = report::dashboard_summary(&readings);

    let mut out = invocation.output()?;
    match format {
        Format::Table => {
            writeln!(out, "Readings:          {}", summary.total_readings)?;
            writeln!(out, "Locations:         {}", summary.distinct_locations)?;
            writeln!(out, "Internal average:  {:.2}", summary.internal_average)?;
            writeln!(out, "External average:  {:.2}", summary.external_average)?;
            writeln!(out, "\nHottest products")?;
            write_group_table(&mut out, &summary.hottest_products)?;
            writeln!(out, "\nColdest products")?;
            write_group_table(&mut out, &summary.coldest_products)?;
        }
        Format::Json => serde_json::to_writer_pretty(&mut out, &summary)?,
        Format::Csv => return Err(no_csv("dashboard")),
    }
    out.flush()?;
    Ok(())
}

fn alerts<S: ReadingStore>(
    store: &mut S,
    context: &AccessContext,
    invocation: &Invocation<'_>,
    configuration: &Configuration,
) -> Result<()> {
    context.require(Capability::ViewCharts)?;
    let format = invocation.format()?;
    let threshold = invocation
        .parsed::<f64>("threshold")?
        .unwrap_or(configuration.alert_threshold);
    let readings = fetch(store, invocation)?;
    let alerts = report::threshold_alerts(&readings, threshold);
    log::info!(
        target: "qclogd::report",
        "{} of {} reading(s) above {:.1}",
        alerts.len(),
        readings.len(),
        threshold
    );

    let mut out = invocation.output()?;
    match format {
        Format::Table => {
            for alert in &alerts {
                let breaches: Vec<String> = alert.breaches.iter().map(|probe| probe.to_string()).collect();
                writeln!(out, "{} [{}]", reading_line(alert.reading), breaches.join(", "))?;
            }
            writeln!(out, "{} alert(s) above {:.1} °C", alerts.len(), threshold)?;
        }
        Format::Json => serde_json::to_writer_pretty(&mut out, &alerts)?,
        Format::Csv => export::write_alerts(&mut out, &alerts)?,
    }
    out.flush()?;
    Ok(())
}

fn activity<S>(store: &mut S, context: &AccessContext, invocation: &Invocation<'_>) -> Result<()>
where
    S: ReadingStore + UserStore,
{
    context.require(Capability::ViewPerformance)?;
    let format = invocation.format()?;
    let readings = fetch(store, invocation)?;
    let profiles = store.list_users()?;
    let activity = report::operator_activity(&readings, &profiles);

    let mut out = invocation.output()?;
    match format {
        Format::Table => {
            writeln!(out, "{:<32} {:>8}", "operator", "readings")?;
            for operator in &activity.operators {
                writeln!(out, "{:<32} {:>8}", operator.name, operator.readings)?;
            }
            writeln!(out, "\n{:<6} {:>8} {:>9} {:>13}", "shift", "readings", "operators", "per operator")?;
            for shift in &activity.shifts {
                writeln!(
                    out,
                    "{:<6} {:>8} {:>9} {:>13.2}",
                    shift.shift, shift.readings, shift.active_operators, shift.average_per_operator
                )?;
            }
        }
        Format::Json => serde_json::to_writer_pretty(&mut out, &activity)?,
        Format::Csv => return Err(no_csv("activity")),
    }
    out.flush()?;
    Ok(())
}

fn timeline<S: ReadingStore>(store: &mut S, context: &AccessContext, invocation: &Invocation<'_>) -> Result<()> {
    context.require(Capability::ViewCharts)?;
    let format = invocation.format()?;
    let readings = fetch(store, invocation)?;
    let ordered = report::timeline(&readings);

    let mut out = invocation.output()?;
    match format {
        Format::Table => write_reading_table(&mut out, &ordered)?,
        Format::Json => serde_json::to_writer_pretty(&mut out, &ordered)?,
        Format::Csv => {
            let ordered: Vec<TemperatureReading> = ordered.into_iter().cloned().collect();
            export::write_readings(&mut out, &ordered)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn permissions_of(matches: &ArgMatches<'_>) -> Vec<String> {
    matches
        .values_of("permission")
        .map(|values| values.map(str::to_string).collect())
        .unwrap_or_default()
}

fn users<S: UserStore>(store: &mut S, context: &AccessContext, invocation: &Invocation<'_>) -> Result<()> {
    match invocation.command.subcommand() {
        ("list", Some(command)) => {
            let list = Invocation {
                global: invocation.global,
                command,
            };
            let operators = store::list_operators(store, context)?;
            let mut out = list.output()?;
            match list.format()? {
                Format::Table => {
                    for profile in &operators {
                        let permissions: Vec<&str> = profile.permissions.iter().map(String::as_str).collect();
                        writeln!(
                            out,
                            "{:<28} {:<24} {:<32} {:<8} {}",
                            profile.id,
                            profile.name,
                            profile.email,
                            profile.employee_number,
                            permissions.join(" ")
                        )?;
                    }
                }
                Format::Json => serde_json::to_writer_pretty(&mut out, &operators)?,
                Format::Csv => return Err(no_csv("users list")),
            }
            out.flush()?;
            Ok(())
        }
        ("add", Some(command)) => {
            let role = command.value_of("role").unwrap_or("user").parse::<Role>()?;
            let profile = UserProfile {
                id: command.value_of("id").unwrap_or_default().trim().to_string(),
                name: command.value_of("name").unwrap_or_default().trim().to_string(),
                email: command.value_of("email").unwrap_or_default().trim().to_string(),
                employee_number: command.value_of("employee-number").unwrap_or_default().trim().to_string(),
                role,
                permissions: permissions_of(command).into_iter().collect(),
            };
            let profile = store::create_user(store, context, profile)?;
            println!("Created profile '{}' for {}", profile.id, profile.email);
            Ok(())
        }
        ("update", Some(command)) => {
            let id = command.value_of("id").unwrap_or_default();
            let name = command.value_of("name").unwrap_or_default();
            store::update_user(store, context, id, name, &permissions_of(command))?;
            println!("Updated profile '{}'", id);
            Ok(())
        }
        ("remove", Some(command)) => {
            let id = command.value_of("id").unwrap_or_default();
            store::delete_user(store, context, id)?;
            println!("Removed profile '{}'", id);
            Ok(())
        }
        (other, _) => Err(Error::InvalidArgument(format!("unknown users command '{}'", other))),
    }
}
