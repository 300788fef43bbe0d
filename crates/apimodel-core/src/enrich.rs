//! Derived-field enrichment.
//!
//! Runs once over an assembled model and fills in what can only be inferred
//! from conventions: AIP-4233 pagination, auto-populated request IDs and
//! long-running operation typing.

use crate::model::{Api, Field, FieldFormat, Method, PaginationInfo, Typez};
use crate::service_config::ServiceConfig;
use crate::symbols::SymbolTable;

const PAGE_SIZE: [&str; 2] = ["page_size", "pageSize"];
const MAX_RESULTS: [&str; 2] = ["max_results", "maxResults"];
const PAGE_TOKEN: [&str; 2] = ["page_token", "pageToken"];
const NEXT_PAGE_TOKEN: [&str; 2] = ["next_page_token", "nextPageToken"];
const PAGE_SIZE_WRAPPERS: [&str; 2] = [".google.protobuf.Int32Value", ".google.protobuf.UInt32Value"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichStats {
    pub pageable: usize,
    pub auto_populated: usize,
    pub long_running: usize,
}

/// Enrich every method of every service in `api`.
pub fn enrich(api: &mut Api, config: Option<&ServiceConfig>) -> EnrichStats {
    let mut stats = EnrichStats::default();
    let method_ids: Vec<String> = api
        .services()
        .flat_map(|s| s.methods.iter().cloned())
        .collect();

    for id in &method_ids {
        if update_pagination(&mut api.state, id) {
            stats.pageable += 1;
        }
        stats.auto_populated += update_auto_populated(&mut api.state, id, config);
        if check_operation_info(&api.state, id) {
            stats.long_running += 1;
        }
    }
    tracing::debug!(
        methods = method_ids.len(),
        pageable = stats.pageable,
        auto_populated = stats.auto_populated,
        long_running = stats.long_running,
        "enriched model"
    );
    stats
}

// =============================================================================
// Pagination
// =============================================================================

fn named(field: &Field, names: &[&str]) -> bool {
    names.contains(&field.name.as_str())
}

fn is_page_size(field: &Field) -> bool {
    if field.repeated || field.map {
        return false;
    }
    let integer = matches!(field.typez, Typez::Int32 | Typez::UInt32);
    if named(field, &PAGE_SIZE) {
        return integer;
    }
    if named(field, &MAX_RESULTS) {
        return integer
            || (field.typez == Typez::Message && PAGE_SIZE_WRAPPERS.contains(&field.typez_id.as_str()));
    }
    false
}

/// Returns the page-token field name and the response pagination info when
/// `method` follows AIP-4233.
pub fn pagination_of(state: &SymbolTable, method: &Method) -> Option<(String, PaginationInfo)> {
    let request = state.message_by_id(&method.input_type_id)?;
    let response = state.message_by_id(&method.output_type_id)?;

    if !request.fields.iter().any(is_page_size) {
        return None;
    }
    let page_token = request
        .fields
        .iter()
        .find(|f| named(f, &PAGE_TOKEN) && f.is_singular_string())?;
    let next_page_token = response
        .fields
        .iter()
        .find(|f| named(f, &NEXT_PAGE_TOKEN) && f.is_singular_string())?;
    // First repeated message field in declaration order.
    let item = response
        .fields
        .iter()
        .find(|f| f.repeated && !f.map && f.typez == Typez::Message)?;

    Some((
        page_token.name.clone(),
        PaginationInfo {
            next_page_token: next_page_token.name.clone(),
            pageable_item: item.name.clone(),
        },
    ))
}

fn update_pagination(state: &mut SymbolTable, method_id: &str) -> bool {
    let Some(method) = state.method_by_id(method_id) else {
        return false;
    };
    let output_id = method.output_type_id.clone();
    let Some((page_token, info)) = pagination_of(state, method) else {
        return false;
    };
    if let Some(response) = state.message_by_id_mut(&output_id) {
        response.pagination = Some(info);
    }
    if let Some(method) = state.method_by_id_mut(method_id) {
        method.pagination = Some(page_token);
    }
    true
}

// =============================================================================
// Auto-populated fields
// =============================================================================

/// A request field may be auto-populated when it is a singular string with
/// the UUID4 format and is not REQUIRED.
pub fn is_auto_populate_candidate(field: &Field) -> bool {
    field.is_singular_string() && field.format == Some(FieldFormat::Uuid4) && !field.is_required()
}

fn update_auto_populated(state: &mut SymbolTable, method_id: &str, config: Option<&ServiceConfig>) -> usize {
    let Some(method) = state.method_by_id(method_id) else {
        return 0;
    };
    let input_id = method.input_type_id.clone();
    let allowed = config.map(|c| c.auto_populated_fields(method_id)).unwrap_or(&[]);

    let mut names = Vec::new();
    if let Some(request) = state.message_by_id_mut(&input_id) {
        for field in request.fields.iter_mut() {
            if is_auto_populate_candidate(field) && allowed.contains(&field.name) {
                field.auto_populated = true;
                names.push(field.name.clone());
            }
        }
    }
    let count = names.len();
    if let Some(method) = state.method_by_id_mut(method_id) {
        method.auto_populated = names;
    }
    count
}

// =============================================================================
// Long-running operations
// =============================================================================

/// Whether the method is long-running with both operation types resolved.
/// Unresolved types are left in place so that cross-referencing rejects the
/// model instead of the method quietly becoming a plain call.
fn check_operation_info(state: &SymbolTable, method_id: &str) -> bool {
    let Some(info) = state
        .method_by_id(method_id)
        .and_then(|m| m.operation_info.as_ref())
    else {
        return false;
    };
    let missing: Vec<&String> = [&info.response_type_id, &info.metadata_type_id]
        .into_iter()
        .filter(|id| state.message_by_id(id).is_none())
        .collect();
    if missing.is_empty() {
        return true;
    }
    tracing::warn!(
        method = %method_id,
        missing = ?missing,
        "long-running operation types not found"
    );
    false
}
