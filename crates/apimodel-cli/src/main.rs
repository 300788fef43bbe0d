//! apimodel CLI
//!
//! - `build`: ingest a descriptor set or OpenAPI document, print a summary and
//!   optionally dump the validated model as JSON
//! - `template`: parse a path or routing template and print its structure

use anyhow::{Context, Result};
use apimodel::model::Api;
use apimodel::template::{parse_routing_rule, PathSegment, PathTemplate, RoutingRule};
use apimodel::{BuildReport, ModelOptions, OpenApiOptions, ProtobufOptions, SpecificationFormat};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apimodel")]
#[command(author, version, about = "Build a validated API model from protobuf or OpenAPI sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the model, print a summary, optionally write it as JSON.
    Build {
        /// Input format: `protobuf` (descriptor set JSON) or `openapi`.
        #[arg(long)]
        format: SpecificationFormat,
        /// Descriptor set JSON or OpenAPI document.
        #[arg(short, long)]
        input: PathBuf,
        /// Service configuration (YAML, or JSON by extension).
        #[arg(long)]
        service_config: Option<PathBuf>,
        /// Descriptor files whose name starts with this prefix produce services.
        #[arg(long)]
        target_prefix: Option<String>,
        /// Descriptor files that produce services (repeatable).
        #[arg(long = "target-file")]
        target_files: Vec<String>,
        /// Package for OpenAPI models (default: derived from the service config).
        #[arg(long)]
        package_name: Option<String>,
        /// Write the model as pretty JSON.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Parse a template and print its structure.
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// An HTTP path template, e.g. `/v1/{name=projects/*/secrets/*}:access`.
    Path { template: String },
    /// A routing parameter template, e.g. `{routing_id=projects/*}/**`.
    Routing {
        template: String,
        /// Request field the template is applied to.
        #[arg(long, default_value = "name")]
        field: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for piping.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            format,
            input,
            service_config,
            target_prefix,
            target_files,
            package_name,
            out,
        } => {
            let options = ModelOptions {
                protobuf: ProtobufOptions {
                    target_files,
                    target_prefix,
                },
                openapi: OpenApiOptions { package_name },
                service_config: None,
            };
            cmd_build(format, input, service_config, options, out)
        }
        Commands::Template { command } => match command {
            TemplateCommands::Path { template } => cmd_template_path(&template),
            TemplateCommands::Routing { template, field } => cmd_template_routing(&field, &template),
        },
    }
}

// ============================================================================
// build
// ============================================================================

fn cmd_build(
    format: SpecificationFormat,
    input: PathBuf,
    service_config: Option<PathBuf>,
    options: ModelOptions,
    out: Option<PathBuf>,
) -> Result<()> {
    println!("{} {} {}", "Building".green().bold(), format, input.display());
    let (api, report) = apimodel::build_model_from_path_with_report(
        format,
        &input,
        service_config.as_deref(),
        options,
    )?;
    print_summary(&api, &report);

    if let Some(out) = out {
        let json = serde_json::to_string_pretty(&api).context("failed to serialize model")?;
        std::fs::write(&out, json).with_context(|| format!("failed to write {}", out.display()))?;
        println!("  {} {}", "→".cyan(), out.display());
    }
    Ok(())
}

fn print_summary(api: &Api, report: &BuildReport) {
    tracing::info!(
        api = %api.name,
        package = %api.package_name,
        services = api.services.len(),
        "model built"
    );
    println!(
        "{} {} ({})",
        "ok".green().bold(),
        api.name.bold(),
        api.package_name
    );
    if !api.title.is_empty() {
        println!("  {}", api.title);
    }
    for service in api.services() {
        let host = if service.default_host.is_empty() {
            String::new()
        } else {
            format!(" [{}]", service.default_host)
        };
        println!("  {} {}{}", "service".cyan(), service.name.bold(), host);
        for method in api.methods(service) {
            let mut tags = Vec::new();
            if method.is_pageable() {
                tags.push("pageable");
            }
            if method.is_long_running() {
                tags.push("lro");
            }
            if !method.auto_populated.is_empty() {
                tags.push("auto-populated");
            }
            if method.source_service_id.is_some() {
                tags.push("mixin");
            }
            if method.deprecated {
                tags.push("deprecated");
            }
            let verb = method
                .path_info
                .bindings
                .first()
                .map(|b| format!("{} {}", b.verb, b.path_template))
                .unwrap_or_else(|| "(no http binding)".to_string());
            let tags = if tags.is_empty() {
                String::new()
            } else {
                format!(" {}", tags.join(",").yellow())
            };
            println!("    {} {}{}", method.name, verb.dimmed(), tags);
        }
    }
    println!(
        "  {} {} messages, {} enums",
        "→".yellow(),
        api.messages.len(),
        api.enums.len()
    );
    if let Some(ingest) = &report.ingest {
        println!(
            "  {} {} files ({} targets), {} methods dropped",
            "→".yellow(),
            ingest.files,
            ingest.target_files,
            ingest.dropped_methods
        );
    }
    if let Some(mixins) = &report.mixins {
        println!(
            "  {} {} mixin methods composed",
            "→".yellow(),
            mixins.composed_methods
        );
    }
    println!(
        "  {} {} pageable, {} auto-populated, {} long-running",
        "→".yellow(),
        report.enrich.pageable,
        report.enrich.auto_populated,
        report.enrich.long_running
    );
}

// ============================================================================
// template
// ============================================================================

fn cmd_template_path(template: &str) -> Result<()> {
    let parsed = PathTemplate::parse(template)?;
    println!("{} {}", "ok".green().bold(), parsed);
    for segment in &parsed.segments {
        match segment {
            PathSegment::Literal(lit) => println!("  {} {}", "literal".cyan(), lit),
            PathSegment::Variable(var) => println!(
                "  {} {} = {}",
                "variable".cyan(),
                var.field_path.join(".").bold(),
                var.segments
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("/")
            ),
            PathSegment::Verb(verb) => println!("  {} {}", "verb".cyan(), verb),
        }
    }
    Ok(())
}

fn cmd_template_routing(field: &str, template: &str) -> Result<()> {
    let rule = RoutingRule::new(field, template);
    let Some((header, variant)) = parse_routing_rule(&rule)? else {
        println!("{} no routing header", "ok".green().bold());
        return Ok(());
    };
    println!("{} header {}", "ok".green().bold(), header.bold());
    println!("  {} {}", "field".cyan(), variant.field_path.join("."));
    println!("  {} {}", "prefix".cyan(), variant.prefix);
    println!("  {} {}", "matching".cyan(), variant.matching);
    println!("  {} {}", "suffix".cyan(), variant.suffix);
    Ok(())
}
