//! Navigation targets and their query-string contracts.

use std::fmt;

use crate::error::WorkflowError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Map,
    Facility(String),
    CreditBuilder { facility: Option<String> },
    Brief { facility: String, sites: Vec<String> },
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Map => write!(f, "/map"),
            Route::Facility(id) => write!(f, "/facility/{}", urlencoding::encode(id)),
            Route::CreditBuilder { facility: None } => write!(f, "/credit-builder"),
            Route::CreditBuilder { facility: Some(id) } => {
                write!(f, "/credit-builder?facility={}", urlencoding::encode(id))
            }
            Route::Brief { facility, sites } => {
                let sites: Vec<String> = sites.iter().map(|s| urlencoding::encode(s).into_owned()).collect();
                write!(f, "/brief?facility={}&sites={}", urlencoding::encode(facility), sites.join(","))
            }
        }
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Required parameters of the report route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BriefQuery {
    pub facility: String,
    pub sites: Vec<String>,
}

impl BriefQuery {
    /// Parse `facility=<id>&sites=<id,id,...>`. A leading `?` or a full
    /// `/brief?...` path is accepted.
    pub fn parse(input: &str) -> Result<Self, WorkflowError> {
        let query = input.split_once('?').map_or(input, |(_, q)| q);

        let facility = query_param(query, "facility")
            .map(|v| decode(&v))
            .filter(|v| !v.is_empty())
            .ok_or(WorkflowError::MissingRouteParams)?;

        let sites: Vec<String> = query_param(query, "sites")
            .map(|v| v.split(',').map(decode).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if sites.is_empty() {
            return Err(WorkflowError::MissingRouteParams);
        }

        Ok(Self { facility, sites })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brief_route_round_trip() {
        let route = Route::Brief {
            facility: "F1".into(),
            sites: vec!["reforestation-20-1".into(), "reforestation-20-3".into()],
        };
        let path = route.to_string();
        assert_eq!(path, "/brief?facility=F1&sites=reforestation-20-1,reforestation-20-3");

        let parsed = BriefQuery::parse(&path).unwrap();
        assert_eq!(parsed.facility, "F1");
        assert_eq!(parsed.sites.len(), 2);
    }

    #[test]
    fn test_missing_params_rejected() {
        assert!(matches!(BriefQuery::parse("facility=F1"), Err(WorkflowError::MissingRouteParams)));
        assert!(matches!(BriefQuery::parse("sites=a,b"), Err(WorkflowError::MissingRouteParams)));
        assert!(matches!(BriefQuery::parse("facility=F1&sites="), Err(WorkflowError::MissingRouteParams)));
    }

    #[test]
    fn test_encoded_ids() {
        let route = Route::Brief { facility: "A B".into(), sites: vec!["x,y".into()] };
        let parsed = BriefQuery::parse(&route.to_string()).unwrap();
        assert_eq!(parsed.facility, "A B");
        assert_eq!(parsed.sites, vec!["x,y"]);
    }

    #[test]
    fn test_credit_builder_path() {
        let route = Route::CreditBuilder { facility: Some("F2".into()) };
        assert_eq!(route.to_string(), "/credit-builder?facility=F2");
        assert_eq!(Route::Map.to_string(), "/map");
    }
}
