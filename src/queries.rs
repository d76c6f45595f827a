//! SQL for the dashboard panels.
//!
//! Every statement reads the flow log table named in [`QuerySettings`].
//! The table name is validated as a plain identifier when the config is
//! loaded, and every other interpolated value is numeric.

use crate::config::QuerySettings;

fn window_filter(settings: &QuerySettings) -> String {
    format!(
        "WHERE FROM_UNIXTIME(\"start\") > NOW() - INTERVAL '{}' HOUR",
        settings.window_hours
    )
}

/// Flow count per action (ACCEPT / REJECT).
pub fn traffic_status(settings: &QuerySettings) -> String {
    format!(
        "SELECT action, COUNT(*) AS flow_count\n\
         FROM {} {}\n\
         GROUP BY action;",
        settings.table,
        window_filter(settings)
    )
}

/// Sources ranked by total bytes sent.
pub fn top_talkers(settings: &QuerySettings) -> String {
    format!(
        "SELECT srcaddr, SUM(bytes) AS total_bytes\n\
         FROM {} {}\n\
         GROUP BY srcaddr ORDER BY total_bytes DESC LIMIT {};",
        settings.table,
        window_filter(settings),
        settings.top_limit
    )
}

/// Flow count per minute.
pub fn traffic_over_time(settings: &QuerySettings) -> String {
    format!(
        "SELECT date_trunc('minute', FROM_UNIXTIME(\"start\")) AS time_bucket, COUNT(*) AS flow_count\n\
         FROM {} {}\n\
         GROUP BY 1 ORDER BY 1;",
        settings.table,
        window_filter(settings)
    )
}

/// Sources with many connection attempts in a short window.
pub fn ddos_candidates(settings: &QuerySettings) -> String {
    format!(
        "SELECT srcaddr, COUNT(*) AS connection_attempts\n\
         FROM {} WHERE FROM_UNIXTIME(\"start\") > NOW() - INTERVAL '{}' MINUTE\n\
         GROUP BY srcaddr HAVING COUNT(*) > {}\n\
         ORDER BY connection_attempts DESC LIMIT {};",
        settings.table,
        settings.ddos_window_minutes,
        settings.ddos_min_connections,
        settings.top_limit
    )
}

/// Sources rejected on many distinct destination ports.
pub fn port_scan_candidates(settings: &QuerySettings) -> String {
    format!(
        "SELECT srcaddr, COUNT(DISTINCT dstport) AS unique_ports_scanned\n\
         FROM {} {} AND action = 'REJECT'\n\
         GROUP BY srcaddr HAVING COUNT(DISTINCT dstport) > {}\n\
         ORDER BY unique_ports_scanned DESC LIMIT {};",
        settings.table,
        window_filter(settings),
        settings.port_scan_min_ports,
        settings.top_limit
    )
}

/// Latest flow records, newest first.
pub fn recent_logs(settings: &QuerySettings) -> String {
    format!(
        "SELECT FROM_UNIXTIME(\"start\") AS flow_timestamp, srcaddr, dstaddr, dstport, protocol, action, bytes\n\
         FROM {} ORDER BY \"start\" DESC LIMIT {};",
        settings.table, settings.recent_limit
    )
}
