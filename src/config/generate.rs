pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGRELAY CONFIGURATION
# =============================================================================
# Two stages share this file:
#
#   collector:   tails *.log files and flushes collected_<source> files
#   processor:   enriches collected_* files into processed_<name> files
#
# Every key is optional; omitted keys use the defaults shown here.
# Paths may reference environment variables with $env{NAME} and may start
# with ~ for the home directory.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logrelay/config.yml
#   3. /etc/logrelay/config.yml

# =============================================================================
# COLLECTOR
# =============================================================================
collector:
  # Directory scanned for watched log files
  logs_dir: /logs
  # Directory receiving collected_<source> files, offsets.json and
  # collection_stats.json
  output_dir: /collected-logs
  # Only files whose name ends with this suffix are watched
  file_suffix: .log
  # Where to begin in a file seen for the first time: beginning | end
  read_start: beginning
  scan_interval: 1s
  flush_interval: 5s
  stats_interval: 30s
  # Persist offsets so a restart does not re-read lines already collected
  checkpoint: true

# =============================================================================
# PROCESSOR
# =============================================================================
processor:
  # Usually the collector's output_dir
  input_dir: /collected-logs
  # Directory receiving processed_<name> files and processing_stats.json
  output_dir: /processed-logs
  # Only files starting with this prefix are picked up
  input_prefix: collected_
  poll_interval: 5s
  stats_interval: 60s
  # Evaluated in order; the first pattern contained in the file name selects
  # the category. Files matching nothing are stamped 'unknown'.
  # Categories: access | error | application | database | job | unknown
  routes:
    - pattern: access.log
      category: access
    - pattern: error.log
      category: error
    - pattern: application.log
      category: application
    - pattern: database-queries.log
      category: database
    - pattern: job-execution.log
      category: job
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::{parse_config_str, validate_config};
    use crate::config::types::default_routes;

    #[test]
    fn test_starter_config_matches_defaults() {
        let config = parse_config_str(&generate_starter_config()).unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.processor.routes, default_routes());
        assert!(config.collector.checkpoint);
    }
}
