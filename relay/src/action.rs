//! Client actions and the upstream calls they translate to.
//!
//! A client posts `{"action": ..., ...fields}`. Parsing validates the action
//! and its required fields once; the resulting [`Action`] is then turned into
//! an [`OutboundCall`] for every key the dispatcher tries.
//!
//! | action                     | upstream call                                  |
//! |----------------------------|------------------------------------------------|
//! | `geocode`                  | `GET /geocode/autocomplete?api_key=..&text=..` |
//! | `route`, `direct_distance` | `POST /v2/directions/{profile}/geojson`        |
//! | `optimization`             | `POST /optimization`                           |

use crate::config::{ApiKey, GeocodeConfig, UpstreamConfig};
use crate::errors::ValidationError;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName};
use http::Method;
use hyper::body::Bytes;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use url::Url;

/// A validated client request.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Geocode {
        query: String,
    },
    Route {
        coordinates: JsonValue,
    },
    /// Same upstream call as [`Action::Route`]; kept apart so clients can
    /// keep using both names.
    DirectDistance {
        coordinates: JsonValue,
    },
    Optimization {
        vehicles: JsonValue,
        tasks: OptimizationTasks,
    },
}

/// The work items of an optimization problem. Only one kind is forwarded.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizationTasks {
    Jobs(JsonValue),
    Shipments(JsonValue),
}

impl Action {
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let Ok(JsonValue::Object(mut fields)) = serde_json::from_slice::<JsonValue>(body) else {
            return Err(ValidationError::InvalidRequest);
        };

        let action = match take(&mut fields, "action") {
            Some(JsonValue::String(action)) => action,
            Some(other) => return Err(ValidationError::UnknownAction(other.to_string())),
            None => return Err(ValidationError::InvalidRequest),
        };

        match action.as_str() {
            "geocode" => match take(&mut fields, "query") {
                Some(query) => Ok(Action::Geocode {
                    query: query_text(query)?,
                }),
                None => Err(missing("geocode", vec!["query"])),
            },
            "route" => {
                let coordinates = take(&mut fields, "coordinates")
                    .ok_or_else(|| missing("route", vec!["coordinates"]))?;
                Ok(Action::Route { coordinates })
            }
            "direct_distance" => {
                let coordinates = take(&mut fields, "coordinates")
                    .ok_or_else(|| missing("direct_distance", vec!["coordinates"]))?;
                Ok(Action::DirectDistance { coordinates })
            }
            "optimization" => {
                let vehicles = take(&mut fields, "vehicles");
                // jobs win over shipments when both are sent
                let tasks = match (take(&mut fields, "jobs"), take(&mut fields, "shipments")) {
                    (Some(jobs), _) => Some(OptimizationTasks::Jobs(jobs)),
                    (None, Some(shipments)) => Some(OptimizationTasks::Shipments(shipments)),
                    (None, None) => None,
                };

                match (vehicles, tasks) {
                    (Some(vehicles), Some(tasks)) => Ok(Action::Optimization { vehicles, tasks }),
                    (vehicles, tasks) => {
                        let mut fields = Vec::new();
                        if vehicles.is_none() {
                            fields.push("vehicles");
                        }
                        if tasks.is_none() {
                            fields.push("jobs o shipments");
                        }
                        Err(missing("optimization", fields))
                    }
                }
            }
            _ => Err(ValidationError::UnknownAction(action)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Geocode { .. } => "geocode",
            Action::Route { .. } => "route",
            Action::DirectDistance { .. } => "direct_distance",
            Action::Optimization { .. } => "optimization",
        }
    }
}

/// A present field holding `null` counts as missing.
fn take(fields: &mut Map<String, JsonValue>, name: &str) -> Option<JsonValue> {
    fields.remove(name).filter(|value| !value.is_null())
}

/// Scalars are sent as text, e.g. a postal code posted as a number.
/// `true` becomes `"1"` and `false` the empty string.
fn query_text(query: JsonValue) -> Result<String, ValidationError> {
    match query {
        JsonValue::String(query) => Ok(query),
        JsonValue::Number(number) => Ok(number.to_string()),
        JsonValue::Bool(true) => Ok("1".to_string()),
        JsonValue::Bool(false) => Ok(String::new()),
        _ => Err(ValidationError::InvalidFieldType { field: "query" }),
    }
}

fn missing(action: &'static str, fields: Vec<&'static str>) -> ValidationError {
    ValidationError::MissingFields { action, fields }
}

#[derive(Serialize)]
struct DirectionsBody<'a> {
    coordinates: &'a JsonValue,
    geometry: bool,
}

#[derive(Serialize)]
struct OptimizationBody<'a> {
    vehicles: &'a JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<&'a JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipments: Option<&'a JsonValue>,
}

/// Upstream endpoint layout, resolved once from config.
#[derive(Clone, Debug)]
pub struct Endpoints {
    geocode: Url,
    directions: Url,
    optimization: Url,
    geocode_filters: GeocodeConfig,
}

impl Endpoints {
    pub fn new(config: &UpstreamConfig) -> Self {
        let base = &config.base_url;
        Self {
            geocode: join(base, &["geocode", "autocomplete"]),
            directions: join(base, &["v2", "directions", &config.directions_profile, "geojson"]),
            optimization: join(base, &["optimization"]),
            geocode_filters: config.geocode.clone(),
        }
    }
}

/// Appends path segments to `base`, keeping any path it already has.
fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// One HTTP call to the upstream API, fully resolved for a single key.
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundCall {
    pub url: Url,
    pub method: Method,
    pub body: Option<Bytes>,
    pub headers: Vec<(HeaderName, String)>,
}

impl OutboundCall {
    pub fn build(
        action: &Action,
        endpoints: &Endpoints,
        key: &ApiKey,
    ) -> Result<Self, serde_json::Error> {
        match action {
            Action::Geocode { query } => {
                let filters = &endpoints.geocode_filters;
                let mut url = endpoints.geocode.clone();
                url.query_pairs_mut()
                    .append_pair("api_key", key.expose())
                    .append_pair("text", query)
                    .append_pair("boundary.country", &filters.country)
                    .append_pair("size", &filters.size.to_string())
                    .append_pair("lang", &filters.lang);

                Ok(Self {
                    url,
                    method: Method::GET,
                    body: None,
                    headers: Vec::new(),
                })
            }
            Action::Route { coordinates } | Action::DirectDistance { coordinates } => {
                let body = DirectionsBody {
                    coordinates,
                    geometry: true,
                };
                Self::post_json(endpoints.directions.clone(), &body, key)
            }
            Action::Optimization { vehicles, tasks } => {
                let (jobs, shipments) = match tasks {
                    OptimizationTasks::Jobs(jobs) => (Some(jobs), None),
                    OptimizationTasks::Shipments(shipments) => (None, Some(shipments)),
                };
                let body = OptimizationBody {
                    vehicles,
                    jobs,
                    shipments,
                };
                Self::post_json(endpoints.optimization.clone(), &body, key)
            }
        }
    }

    fn post_json<T: Serialize>(
        url: Url,
        body: &T,
        key: &ApiKey,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(body).map(Bytes::from)?;
        Ok(Self {
            url,
            method: Method::POST,
            body: Some(body),
            headers: vec![
                (AUTHORIZATION, key.expose().to_string()),
                (CONTENT_TYPE, "application/json".to_string()),
            ],
        })
    }
}

// Keys travel in the query string or the Authorization header, so neither is
// printed.
impl fmt::Debug for OutboundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = format!(
            "{}{}",
            self.url.origin().ascii_serialization(),
            self.url.path()
        );
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("OutboundCall")
            .field("method", &self.method)
            .field("url", &endpoint)
            .field("headers", &header_names)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .finish()
    }
}
