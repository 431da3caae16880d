// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for landscaper operations.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[cfg(test)]
#[path = "./error_test.rs"]
mod error_test;

/// Convenience Result type with landscaper Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, rendering or writing blueprints.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Blueprint document could not be decoded
    #[error("Malformed blueprint: {reason}")]
    #[diagnostic(
        code(landscaper::malformed_blueprint),
        help("A blueprint needs 'apiVersion: landscaper.gardener.cloud/v1alpha1' and 'kind: Blueprint'")
    )]
    MalformedBlueprint { reason: String },

    /// Component descriptor, installation or resource list could not be decoded
    #[error("Malformed descriptor: {reason}")]
    #[diagnostic(code(landscaper::malformed_descriptor))]
    MalformedDescriptor { reason: String },

    /// Import value file is not valid YAML
    #[error("Malformed value file {path:?}: {reason}")]
    #[diagnostic(
        code(landscaper::malformed_value_file),
        help("Value files must contain an 'imports' map")
    )]
    MalformedValueFile { path: PathBuf, reason: String },

    /// Import value file could not be read
    #[error("Failed to read value file {path:?}")]
    #[diagnostic(code(landscaper::value_file_unreadable))]
    ValueFileUnreadable {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Blueprint failed validation against its imports
    #[error("Invalid blueprint:\n  - {}", reasons.join("\n  - "))]
    #[diagnostic(code(landscaper::invalid_blueprint))]
    InvalidBlueprint { reasons: Vec<String> },

    /// No descriptor could be found for a component reference
    #[error("Component {name}:{version} not found")]
    #[diagnostic(
        code(landscaper::component_not_found),
        help("Pass the descriptor with --additional-component-descriptor or check the repository context")
    )]
    ComponentNotFound { name: String, version: String },

    /// A local resource input could not be read
    #[error("Resource input {path:?} is not readable")]
    #[diagnostic(code(landscaper::resource_not_readable))]
    ResourceNotReadable {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// No blob resolver knows how to serve an access type
    #[error("Unsupported access type '{access_type}'")]
    #[diagnostic(code(landscaper::unsupported_access))]
    UnsupportedAccess { access_type: String },

    /// Schema references nest deeper than allowed
    #[error("maxCallDepth ({max_depth}) reached: {}", history.join(" -> "))]
    #[diagnostic(
        code(landscaper::schema_depth_exceeded),
        help("Flatten the schema references or raise the maximum reference depth")
    )]
    SchemaDepthExceeded {
        max_depth: usize,
        history: Vec<String>,
    },

    /// A schema reference could not be loaded
    #[error("Unable to load JSON schema '{reference}': {reason}")]
    #[diagnostic(code(landscaper::schema_load_failed))]
    SchemaLoadFailed { reference: String, reason: String },

    /// A template execution failed
    #[error("Execution '{execution}' failed: {cause}")]
    #[diagnostic(code(landscaper::template_failure))]
    TemplateFailure { execution: String, cause: String },

    /// Two deploy executions produced items of the same name
    #[error("Deploy item '{name}' is produced more than once (executions: {})", executions.join(", "))]
    #[diagnostic(
        code(landscaper::duplicate_deploy_item),
        help("Deploy item names must be unique across all deploy executions")
    )]
    DuplicateDeployItem {
        name: String,
        executions: Vec<String>,
    },

    /// Two sub-installations share a name
    #[error("Subinstallation '{name}' is defined more than once")]
    #[diagnostic(code(landscaper::duplicate_subinstallation))]
    DuplicateSubinstallation { name: String },

    /// Output format other than yaml or json
    #[error("Output format is expected to be json or yaml, got '{given}'")]
    #[diagnostic(code(landscaper::unsupported_output_format))]
    UnsupportedOutputFormat { given: String },

    /// Unknown kind of output requested
    #[error("Unknown output resource '{given}'")]
    #[diagnostic(
        code(landscaper::unsupported_output_kind),
        help("Use one of: all, deployitems (di), subinstallations (subinst, inst)")
    )]
    UnsupportedOutputKind { given: String },

    /// Import parameter is not of the form key=value
    #[error("Invalid import parameter '{given}'")]
    #[diagnostic(
        code(landscaper::invalid_import_parameter),
        help("Import parameters are given as <name>=<value>")
    )]
    InvalidImportParameter { given: String },

    /// Cancellation was requested
    #[error("Operation cancelled")]
    #[diagnostic(code(landscaper::cancelled))]
    Cancelled,

    /// OCI registry request failed
    #[error("Registry request for {reference} failed: {reason}")]
    #[diagnostic(code(landscaper::registry))]
    Registry { reference: String, reason: String },

    /// Configuration file could not be loaded
    #[error("Invalid configuration in {path:?}: {reason}")]
    #[diagnostic(code(landscaper::invalid_config))]
    InvalidConfig { path: PathBuf, reason: String },

    /// Failed to read file
    #[error("Failed to read file: {path:?}")]
    #[diagnostic(code(landscaper::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to write file
    #[error("Failed to write file: {path:?}")]
    #[diagnostic(code(landscaper::write_failed))]
    WriteFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to encode a document
    #[error("Failed to encode document: {0}")]
    #[diagnostic(code(landscaper::encode_failed))]
    Encode(String),

    /// An error annotated with the pipeline step it happened in
    #[error("{step}: {source}")]
    #[diagnostic(code(landscaper::step_failed))]
    InStep {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// IO error passthrough
    #[error(transparent)]
    #[diagnostic(code(landscaper::io_error))]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap this error with the name of the step that produced it.
    pub fn in_step(self, step: &'static str) -> Self {
        Error::InStep {
            step,
            source: Box::new(self),
        }
    }

    /// The innermost error, with all step annotations removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::InStep { source, .. } => source.root(),
            other => other,
        }
    }

    /// True if this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }
}

/// Attach a step name to the error side of a result.
pub trait StepContext<T> {
    fn step(self, step: &'static str) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn step(self, step: &'static str) -> Result<T> {
        self.map_err(|err| err.in_step(step))
    }
}
