//! Template grammars for API wire bindings.
//!
//! Two small, hand-checked grammars live here:
//!
//! - `http`: AIP-127 path templates as found in `google.api.http` rules and
//!   OpenAPI paths (`/v1/{parent=projects/*}/secrets:batchGet`), plus the
//!   query-parameter inference that goes with a binding.
//! - `routing`: AIP-4222 routing header templates
//!   (`{routing_id=projects/*}/**`), merged per header name.
//!
//! Both parsers are built from `nom` combinators; every grammar function
//! returns the unconsumed input alongside its value, so failure offsets are
//! computed from what is left.

pub mod http;
pub mod routing;

pub use http::{
    query_parameters, PathSegment, PathTemplate, PathTemplateError, PathVariable, VariableSegment,
};
pub use routing::{
    parse_routing_rule, parse_routing_rules, RoutingError, RoutingInfo, RoutingPathSpec,
    RoutingRule, RoutingVariant,
};
