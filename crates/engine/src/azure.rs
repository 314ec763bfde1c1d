//! Provider constants and the run-wide `context` parameters.

use sb_types::{EngineSettings, Solution};
use serde_json::{Map, Value};

/// Base domain of IoT Central application hosts.
pub const IOT_CENTRAL_BASE_DOMAIN: &str = "azureiotcentral.com";

/// Maps a resource region to the IoT Central geography serving it.
const IOT_CENTRAL_REGION_MAP: &[(&str, &str)] = &[
    ("eastus", "unitedstates"),
    ("eastus2", "unitedstates"),
    ("centralus", "unitedstates"),
    ("northcentralus", "unitedstates"),
    ("southcentralus", "unitedstates"),
    ("westcentralus", "unitedstates"),
    ("westus", "unitedstates"),
    ("westus2", "unitedstates"),
    ("westus3", "unitedstates"),
    ("northeurope", "europe"),
    ("westeurope", "europe"),
    ("uksouth", "unitedkingdom"),
    ("ukwest", "unitedkingdom"),
    ("japaneast", "japan"),
    ("japanwest", "japan"),
    ("australiaeast", "australia"),
    ("australiasoutheast", "australia"),
    ("southeastasia", "asiapacific"),
    ("eastasia", "asiapacific"),
    ("canadacentral", "canada"),
    ("canadaeast", "canada"),
    ("francecentral", "france"),
    ("germanywestcentral", "germany"),
    ("switzerlandnorth", "switzerland"),
    ("koreacentral", "korea"),
    ("centralindia", "india"),
    ("brazilsouth", "brazil"),
];

/// IoT Central geography for `region`, if one serves it.
pub fn iot_central_geography(region: &str) -> Option<&'static str> {
    let region = region.trim();
    IOT_CENTRAL_REGION_MAP
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(region))
        .map(|(_, geography)| *geography)
}

/// Builds the reserved `context` entry seeded at the start of every run.
pub fn run_context(solution: &Solution, settings: &EngineSettings) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("subscriptionId".into(), Value::String(settings.subscription_id.clone()));
    context.insert("resourceNameSuffix".into(), Value::String(solution.resource_name_suffix.clone()));
    context.insert("resourceLocation".into(), Value::String(solution.resource_location.clone()));
    context.insert("iotCentralBaseDomain".into(), Value::String(IOT_CENTRAL_BASE_DOMAIN.into()));
    if let Some(geography) = iot_central_geography(&solution.resource_location) {
        context.insert("mappedResourceGroupRegion".into(), Value::String(geography.into()));
    }
    context
}

/// Name of the data-explorer cluster created for `solution`.
pub fn data_explorer_cluster_name(solution: &Solution) -> String {
    format!("adx{}", solution.resource_name_suffix)
}
