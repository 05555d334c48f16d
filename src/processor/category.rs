use crate::config::types::RouteConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of log a collected file holds. Picks the enrichment handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Access,
    Error,
    Application,
    Database,
    Job,
    Unknown,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Access => "access",
            LogCategory::Error => "error",
            LogCategory::Application => "application",
            LogCategory::Database => "database",
            LogCategory::Job => "job",
            LogCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered filename routes. The first pattern contained in the file name
/// wins; no match routes to [`LogCategory::Unknown`].
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<RouteConfig>,
}

impl Router {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }

    pub fn route(&self, file_name: &str) -> LogCategory {
        self.routes
            .iter()
            .find(|r| file_name.contains(&r.pattern))
            .map(|r| r.category)
            .unwrap_or(LogCategory::Unknown)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::default_routes;

    #[test]
    fn test_default_routes() {
        let router = Router::new(default_routes());
        assert_eq!(router.route("collected_access.log"), LogCategory::Access);
        assert_eq!(router.route("collected_error.log"), LogCategory::Error);
        assert_eq!(router.route("collected_application.log"), LogCategory::Application);
        assert_eq!(router.route("collected_database-queries.log"), LogCategory::Database);
        assert_eq!(router.route("collected_job-execution.log"), LogCategory::Job);
        assert_eq!(router.route("collected_other.log"), LogCategory::Unknown);
    }

    #[test]
    fn test_first_match_wins() {
        let router = Router::new(vec![
            RouteConfig {
                pattern: "api".to_string(),
                category: LogCategory::Access,
            },
            RouteConfig {
                pattern: "api-error".to_string(),
                category: LogCategory::Error,
            },
        ]);
        assert_eq!(router.route("collected_api-error.log"), LogCategory::Access);
    }

    #[test]
    fn test_category_serde_is_lowercase() {
        let yaml = serde_yaml::to_string(&LogCategory::Database).unwrap();
        assert_eq!(yaml.trim(), "database");
        let parsed: LogCategory = serde_yaml::from_str("job").unwrap();
        assert_eq!(parsed, LogCategory::Job);
    }
}
