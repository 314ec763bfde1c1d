//! Well-known token audiences.

/// Resource-management scope. Calls made with it go through the
/// long-running-operation flow.
pub const AZURE_MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

pub const IOT_CENTRAL_API_SCOPE: &str = "https://apps.azureiotcentral.com/.default";

/// Data-explorer scope; `clusterName` and `resourceLocation` are placeholders.
pub const AZURE_DATA_EXPLORER_API_SCOPE: &str = "https://${clusterName}.${resourceLocation}.kusto.windows.net/.default";

/// Returns true when `scope` is the resource-management scope.
pub fn is_resource_management_scope(scope: &str) -> bool {
    scope == AZURE_MANAGEMENT_SCOPE
}
