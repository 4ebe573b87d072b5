//! Search request parsing.
//!
//! Turns query parameters into a [`SearchRequest`]. Result parameters
//! (`_sort`, `_count`, `_include`, ...) are handled here; every other key must
//! name a search parameter declared for the resource type.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::catalogue::SearchParameterCatalogue;
use crate::config::TokenSearchConfig;
use crate::error::{InvalidSearchError, SearchResult};
use crate::types::{
    Filter, IncludeTarget, Operator, SearchModifier, SearchParamType, SearchPrefix,
    SearchRequest, SortRule, SummaryMode, TotalMode,
};

/// Parses query parameters against one catalogue snapshot.
#[derive(Debug)]
pub struct SearchRequestParser<'a> {
    catalogue: &'a SearchParameterCatalogue,
    config: &'a TokenSearchConfig,
}

impl<'a> SearchRequestParser<'a> {
    /// Creates a parser.
    pub fn new(catalogue: &'a SearchParameterCatalogue, config: &'a TokenSearchConfig) -> Self {
        Self { catalogue, config }
    }

    /// Parses an ordered list of `(key, value)` pairs.
    pub fn parse(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> SearchResult<SearchRequest> {
        let mut request = SearchRequest::new(resource_type);
        for (key, value) in params {
            self.parse_param(&mut request, key, value)?;
        }
        Ok(request)
    }

    /// Parses a raw `application/x-www-form-urlencoded` query string.
    pub fn parse_query_string(
        &self,
        resource_type: &str,
        query: &str,
    ) -> SearchResult<SearchRequest> {
        let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self.parse(resource_type, &params)
    }

    fn parse_param(&self, request: &mut SearchRequest, key: &str, value: &str) -> SearchResult<()> {
        if key == "_" {
            return Ok(());
        }

        let (code, modifier) = split_modifier(key);
        let code = match code.as_str() {
            "id" => "_id".to_string(),
            "meta.lastUpdated" => "_lastUpdated".to_string(),
            _ => code,
        };

        match code.as_str() {
            "_sort" => {
                request.sort_rules.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|field| !field.is_empty())
                        .map(SortRule::parse),
                );
            }
            "_count" => {
                let count = parse_u32("_count", value)?;
                if count > self.config.max_count {
                    debug!(
                        requested = count,
                        max = self.config.max_count,
                        "clamping _count to maximum"
                    );
                }
                request.count = Some(count.min(self.config.max_count));
            }
            "_offset" => {
                request.offset = Some(parse_u32("_offset", value)?);
            }
            "_total" => {
                request.total_mode =
                    Some(TotalMode::parse(value).ok_or_else(|| InvalidSearchError::InvalidValue {
                        parameter: "_total".to_string(),
                        message: format!("'{}' is not one of none, estimate, accurate", value),
                    })?);
            }
            "_summary" => {
                if value == "count" {
                    request.total_mode = Some(TotalMode::Accurate);
                    request.count = Some(0);
                } else {
                    request.summary = Some(SummaryMode::parse(value).ok_or_else(|| {
                        InvalidSearchError::InvalidValue {
                            parameter: "_summary".to_string(),
                            message: format!("unsupported summary mode '{}'", value),
                        }
                    })?);
                }
            }
            "_elements" | "_fields" => {
                request.fields.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|field| !field.is_empty())
                        .map(String::from),
                );
            }
            "_include" => {
                let mut target = IncludeTarget::parse(value)?;
                target.iterate = is_iterate(&code, modifier.as_deref())?;
                request.include.push(target);
            }
            "_revinclude" => {
                IncludeTarget::parse(value)?;
                is_iterate(&code, modifier.as_deref())?;
                if !self.config.allows_revinclude(value) {
                    return Err(InvalidSearchError::UnsupportedRevinclude {
                        value: value.to_string(),
                    });
                }
                if let Some(previous) = &request.reverse_include {
                    debug!(previous = %previous, value, "replacing earlier _revinclude");
                }
                request.reverse_include = Some(value.to_string());
            }
            _ => {
                let filter = self.parse_filter(&request.resource_type, &code, modifier, value)?;
                request.filters.push(filter);
            }
        }

        Ok(())
    }

    fn parse_filter(
        &self,
        resource_type: &str,
        code: &str,
        modifier: Option<String>,
        value: &str,
    ) -> SearchResult<Filter> {
        let unknown = || InvalidSearchError::UnknownParameter {
            resource_type: resource_type.to_string(),
            code: code.to_string(),
        };
        // Chained and reverse-chained searches are not supported.
        if code.contains('.') || code.starts_with("_has") {
            return Err(unknown());
        }
        let param = self.catalogue.get(resource_type, code).ok_or_else(unknown)?;

        let unsupported_modifier = |modifier: &str| InvalidSearchError::UnsupportedModifier {
            code: code.to_string(),
            modifier: modifier.to_string(),
        };
        let parsed_modifier = match modifier.as_deref() {
            Some(raw) => Some(SearchModifier::parse(raw).ok_or_else(|| unsupported_modifier(raw))?),
            None => None,
        };

        match parsed_modifier {
            Some(SearchModifier::Missing) => return Ok(Filter::new(code, Operator::Missing, value)),
            Some(SearchModifier::Present) => return Ok(Filter::new(code, Operator::Present, value)),
            _ => {}
        }

        match param.param_type {
            SearchParamType::Number | SearchParamType::Date => {
                if let Some(raw) = modifier.as_deref() {
                    return Err(unsupported_modifier(raw));
                }
                let (prefix, rest) = SearchPrefix::extract(value);
                if param.param_type == SearchParamType::Date {
                    validate_date(code, rest)?;
                }
                Ok(Filter::new(code, prefix.to_operator(), rest))
            }
            SearchParamType::Quantity => {
                if let Some(raw) = modifier.as_deref() {
                    return Err(unsupported_modifier(raw));
                }
                let mut parts = value.splitn(3, '|');
                let number = parts.next().unwrap_or_default();
                let unit_system = parts.next().filter(|s| !s.is_empty()).map(String::from);
                let unit_code = parts.next().filter(|s| !s.is_empty()).map(String::from);
                let (prefix, number) = SearchPrefix::extract(number);
                Ok(Filter::new(code, prefix.to_operator(), number)
                    .with_units(unit_system, unit_code))
            }
            SearchParamType::String | SearchParamType::Token | SearchParamType::Uri => {
                let operator = match (parsed_modifier, modifier.as_deref()) {
                    (Some(m), Some(raw)) => {
                        m.to_operator().ok_or_else(|| unsupported_modifier(raw))?
                    }
                    _ => Operator::Equals,
                };
                Ok(Filter::new(code, operator, value))
            }
            SearchParamType::Reference => Ok(Filter::new(code, Operator::Equals, value)),
            SearchParamType::Composite | SearchParamType::Special => {
                Err(InvalidSearchError::UnsupportedParameterType {
                    code: code.to_string(),
                    param_type: param.param_type.to_string(),
                })
            }
        }
    }
}

/// Splits `code[:modifier]` on the last unescaped colon.
///
/// `\:` inside the code is unescaped to `:`.
fn split_modifier(key: &str) -> (String, Option<String>) {
    let mut split_at = None;
    let mut escaped = false;
    for (i, c) in key.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ':' => split_at = Some(i),
            _ => {}
        }
    }

    let (code, modifier) = match split_at {
        Some(i) => (&key[..i], Some(key[i + 1..].to_string())),
        None => (key, None),
    };
    (code.replace("\\:", ":"), modifier)
}

fn is_iterate(code: &str, modifier: Option<&str>) -> SearchResult<bool> {
    match modifier {
        None => Ok(false),
        Some("iterate") => Ok(true),
        Some(other) => Err(InvalidSearchError::UnsupportedModifier {
            code: code.to_string(),
            modifier: other.to_string(),
        }),
    }
}

fn parse_u32(parameter: &str, value: &str) -> SearchResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| InvalidSearchError::InvalidInteger {
            parameter: parameter.to_string(),
            value: value.to_string(),
        })
}

/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` and date-times.
fn validate_date(code: &str, value: &str) -> SearchResult<()> {
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    let padded = match value.len() {
        4 if all_digits(value) => Some(format!("{}-01-01", value)),
        7 if value.get(..4).is_some_and(all_digits) => Some(format!("{}-01", value)),
        10 => Some(value.to_string()),
        _ => None,
    };

    let valid = match padded {
        Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok(),
        None => {
            DateTime::parse_from_rfc3339(value).is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        }
    };

    if valid {
        Ok(())
    } else {
        Err(InvalidSearchError::InvalidValue {
            parameter: code.to_string(),
            message: format!("'{}' is not a valid date", value),
        })
    }
}
