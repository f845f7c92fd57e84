//! Sink filter parsing: which node ids the sink consumes.

use std::collections::HashMap;

use tsflow_core::error::{Error, Result};
use tsflow_core::query::SerdesConfig;

/// Parse serdes filter directives into a node-id → source-hint map.
///
/// Accepted forms are `"<nodeId>"` and `"<nodeId>:<sourceHint>"`. Anything
/// else (empty id, more than one colon) is rejected. A trailing empty hint
/// collapses to `None`.
pub(crate) fn parse_sink_filters(
    configs: &[SerdesConfig],
) -> Result<HashMap<String, Option<String>>> {
    let mut sink_filter = HashMap::new();
    for config in configs {
        for filter in &config.filter {
            let mut parts = filter.split(':');
            let id = parts.next().unwrap_or_default();
            if id.is_empty() {
                return Err(Error::InvalidFilter(filter.clone()));
            }
            let hint = parts.next();
            if parts.next().is_some() {
                return Err(Error::InvalidFilter(filter.clone()));
            }
            let hint = hint.filter(|h| !h.is_empty()).map(str::to_string);
            sink_filter.insert(id.to_string(), hint);
        }
    }
    Ok(sink_filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsflow_core::error::Error;

    fn serdes(filters: &[&str]) -> Vec<SerdesConfig> {
        vec![SerdesConfig {
            id: "json".to_string(),
            filter: filters.iter().map(|f| f.to_string()).collect(),
        }]
    }

    #[test]
    fn bare_id_maps_to_none() {
        let parsed = parse_sink_filters(&serdes(&["groupby"])).unwrap();
        assert_eq!(parsed.get("groupby"), Some(&None));
    }

    #[test]
    fn id_with_hint() {
        let parsed = parse_sink_filters(&serdes(&["groupby:m1"])).unwrap();
        assert_eq!(parsed.get("groupby"), Some(&Some("m1".to_string())));
    }

    #[test]
    fn trailing_empty_hint_collapses() {
        let parsed = parse_sink_filters(&serdes(&["groupby:"])).unwrap();
        assert_eq!(parsed.get("groupby"), Some(&None));
    }

    #[test]
    fn rejects_empty_and_multi_colon() {
        assert!(matches!(
            parse_sink_filters(&serdes(&[""])),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            parse_sink_filters(&serdes(&[":hint"])),
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            parse_sink_filters(&serdes(&["a:b:c"])),
            Err(Error::InvalidFilter(_))
        ));
    }

    #[test]
    fn no_serdes_configs_yields_empty_map() {
        assert!(parse_sink_filters(&[]).unwrap().is_empty());
    }
}
