use std::time::Duration;

use fastrace::collector::ConsoleReporter;

/// Flush interval of the console reporter. Zero reports every finished span
/// as soon as its root closes.
const REPORT_INTERVAL: Duration = Duration::from_millis(0);

pub fn start_trace_reporter() {
    log::info!("Reporting traces to the console");

    let config = fastrace::collector::Config::default().report_interval(REPORT_INTERVAL);
    fastrace::set_reporter(ConsoleReporter, config);
}
