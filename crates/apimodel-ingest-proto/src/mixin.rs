//! Mixin composition.
//!
//! A mixin is a well-known auxiliary service (locations, IAM policies,
//! long-running operations) whose methods a primary service re-exposes under
//! its own name, typically with its own HTTP bindings from the service
//! configuration.

use crate::comments::CommentIndex;
use crate::descriptor::{child_path, FileDescriptorSet, FILE_SERVICE};
use crate::{build_service, ProtoIngestStats};
use anyhow::{bail, Context, Result};
use apimodel_core::{is_mixin_api, path_info_from_rule, selector_of, Api, Method, ServiceConfig};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mixin {
    /// Fully-qualified service name, without the leading dot.
    pub service: &'static str,
    /// Canonical file declaring the service.
    pub file: &'static str,
}

impl Mixin {
    pub fn id(&self) -> String {
        format!(".{}", self.service)
    }

    pub fn short_name(&self) -> &'static str {
        self.service.rsplit('.').next().unwrap_or(self.service)
    }
}

pub const LOCATIONS: Mixin = Mixin {
    service: "google.cloud.location.Locations",
    file: "google/cloud/location/locations.proto",
};
pub const IAM_POLICY: Mixin = Mixin {
    service: "google.iam.v1.IAMPolicy",
    file: "google/iam/v1/iam_policy.proto",
};
pub const OPERATIONS: Mixin = Mixin {
    service: "google.longrunning.Operations",
    file: "google/longrunning/operations.proto",
};
pub const MIXINS: [Mixin; 3] = [LOCATIONS, IAM_POLICY, OPERATIONS];

pub fn mixin_for_service(service: &str) -> Option<Mixin> {
    let service = selector_of(service);
    MIXINS.into_iter().find(|m| m.service == service)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MixinStats {
    pub loaded_files: usize,
    pub composed_methods: usize,
    pub skipped_duplicates: usize,
}

/// Compose the enabled mixins into every primary service of `api`.
///
/// Composition runs when the configuration declares a mixin alongside the
/// primary API, or when some primary method is long-running (which forces
/// `Operations.GetOperation`). Running it twice adds nothing the second time.
pub fn compose_mixins(
    api: &mut Api,
    set: &FileDescriptorSet,
    config: Option<&ServiceConfig>,
) -> Result<MixinStats> {
    let mut stats = MixinStats::default();
    let enabled = enabled_methods(api, config);
    if enabled.is_empty() {
        return Ok(stats);
    }

    let primary: Vec<String> = api.services.clone();
    let mut loaded: BTreeSet<&'static str> = BTreeSet::new();

    for (mixin, methods) in &enabled {
        if loaded.insert(mixin.file) && load_mixin(api, set, *mixin)? {
            stats.loaded_files += 1;
        }
        for service_id in primary.iter().filter(|id| !is_mixin_api(id)) {
            for name in methods {
                compose_method(api, config, *mixin, service_id, name, &mut stats)?;
            }
        }
    }

    tracing::debug!(
        mixins = enabled.len(),
        loaded_files = stats.loaded_files,
        composed = stats.composed_methods,
        skipped = stats.skipped_duplicates,
        "composed mixins"
    );
    Ok(stats)
}

/// Mixin → names of the methods to compose, in name order.
fn enabled_methods(api: &Api, config: Option<&ServiceConfig>) -> BTreeMap<Mixin, BTreeSet<String>> {
    let force_operations = api
        .services()
        .flat_map(|s| api.methods(s))
        .any(Method::is_long_running);

    let declared: Vec<Mixin> = config
        .map(|c| c.api_names().filter_map(mixin_for_service).collect())
        .unwrap_or_default();
    let has_primary = config.and_then(ServiceConfig::primary_api).is_some();

    let mut enabled: BTreeMap<Mixin, BTreeSet<String>> = BTreeMap::new();
    if has_primary && !declared.is_empty() {
        let rules = config.map(|c| c.http.rules.as_slice()).unwrap_or(&[]);
        for rule in rules {
            let Some((service, method)) = rule.selector.rsplit_once('.') else {
                continue;
            };
            match declared.iter().find(|m| m.service == service) {
                Some(mixin) => {
                    enabled.entry(*mixin).or_default().insert(method.to_string());
                }
                None if mixin_for_service(service).is_some() => {
                    tracing::warn!(
                        selector = %rule.selector,
                        "http rule names a mixin that is not declared in `apis`"
                    );
                }
                None => {}
            }
        }
    }
    if force_operations {
        enabled
            .entry(OPERATIONS)
            .or_default()
            .insert("GetOperation".to_string());
    }
    enabled
}

/// Build the mixin service from its canonical file unless it already exists.
/// Returns whether a file was loaded.
fn load_mixin(api: &mut Api, set: &FileDescriptorSet, mixin: Mixin) -> Result<bool> {
    if api.state.service_by_id(&mixin.id()).is_some() {
        return Ok(false);
    }
    let Some(file) = set.file_by_name(mixin.file) else {
        bail!(
            "mixin `{}` requires `{}`, which is not in the descriptor set",
            mixin.service,
            mixin.file
        );
    };
    let Some((index, desc)) = file
        .service
        .iter()
        .enumerate()
        .find(|(_, s)| format!("{}.{}", file.package, s.name) == mixin.service)
    else {
        bail!("`{}` does not declare `{}`", mixin.file, mixin.service);
    };
    let comments = CommentIndex::for_file(file);
    let mut ignored = ProtoIngestStats::default();
    build_service(
        &mut api.state,
        file,
        &comments,
        desc,
        child_path(&[], FILE_SERVICE, index),
        &mut ignored,
    )
    .with_context(|| format!("while loading mixin `{}`", mixin.service))?;
    tracing::debug!(mixin = mixin.service, file = mixin.file, "loaded mixin");
    Ok(true)
}

fn compose_method(
    api: &mut Api,
    config: Option<&ServiceConfig>,
    mixin: Mixin,
    service_id: &str,
    name: &str,
    stats: &mut MixinStats,
) -> Result<()> {
    let source_id = format!("{}.{name}", mixin.id());
    let target_id = format!("{service_id}.{name}");

    let already_present = api
        .state
        .service_by_id(service_id)
        .is_some_and(|s| s.methods.contains(&target_id));
    if already_present {
        stats.skipped_duplicates += 1;
        return Ok(());
    }
    let Some(source) = api.state.method_by_id(&source_id) else {
        tracing::warn!(selector = %selector_of(&source_id), "mixin method not found; skipping");
        return Ok(());
    };

    let mut method = source.clone();
    method.id = target_id.clone();
    method.service_id = service_id.to_string();
    method.source_service_id = Some(mixin.id());

    if let Some(rule) = config.and_then(|c| c.http_rule(&source_id)) {
        let request = api.state.message_by_id(&method.input_type_id);
        let path_info = request.map(|r| path_info_from_rule(selector_of(&source_id), rule, r));
        match path_info {
            Some(Ok(info)) => method.path_info = info,
            Some(Err(err)) => {
                tracing::warn!(selector = %selector_of(&source_id), error = %err, "dropping mixin method");
                return Ok(());
            }
            None => {
                tracing::warn!(
                    selector = %selector_of(&source_id),
                    request = %method.input_type_id,
                    "mixin request message not found; dropping mixin method"
                );
                return Ok(());
            }
        }
    }

    method.documentation = match config.and_then(|c| c.documentation_rule(&source_id)) {
        Some(doc) => doc.to_string(),
        None => format!(
            "Provides the [{}][{}] service functionality in this service.",
            mixin.short_name(),
            mixin.service
        ),
    };

    api.state.insert_method(method)?;
    if let Some(service) = api.state.service_by_id_mut(service_id) {
        service.methods.push(target_id);
    }
    stats.composed_methods += 1;
    Ok(())
}
