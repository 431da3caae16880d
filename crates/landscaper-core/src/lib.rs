// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! landscaper-core - local rendering of Landscaper blueprints
//!
//! This crate renders a blueprint into the deploy items and
//! sub-installations Landscaper would create for it, without a cluster.
//!
//! # Overview
//!
//! The component under development is usually only partially published:
//! its descriptor lives in a local file and some of its resources are
//! files on disk. Rendering therefore works on a layered view:
//!
//! - local descriptors are looked up first, an OCI registry second
//!   ([`LayeredResolver`])
//! - blobs of `localFilesystemResource` accesses are read from disk, all
//!   others from the registry ([`LocalBlobResolver`])
//! - import schemas follow `$ref`s into local types, blueprint files and
//!   other components ([`SchemaResolver`])
//!
//! # Example
//!
//! ```yaml
//! # blueprint.yaml
//! apiVersion: landscaper.gardener.cloud/v1alpha1
//! kind: Blueprint
//!
//! imports:
//! - name: cluster
//!   targetType: landscaper.gardener.cloud/kubernetes-cluster
//! - name: replicas
//!   schema:
//!     type: integer
//!
//! deployExecutions:
//! - name: default
//!   type: GoTemplate
//!   template: |
//!     deployItems:
//!     - name: app
//!       type: landscaper.gardener.cloud/helm
//!       target:
//!         import: cluster
//!       config:
//!         replicas: {{ .imports.replicas }}
//! ```

pub mod blob;
pub mod blueprint;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod imports;
pub mod installation;
pub mod oci;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod resources;
pub mod schema;
pub mod template;
pub mod vfs;

pub use blob::{BlobInfo, BlobResolver, LocalBlobResolver};
pub use blueprint::{BLUEPRINT_FILENAME, Blueprint, LANDSCAPER_API_VERSION};
pub use cancel::CancelToken;
pub use codec::OutputFormat;
pub use config::Config;
pub use descriptor::ComponentDescriptor;
pub use error::{Error, Result, StepContext};
pub use imports::{ImportMap, load_value_files, merge_imports};
pub use installation::{Installation, parse_import_parameters, set_import_parameters};
pub use oci::OciComponentResolver;
pub use output::{Materializer, OutputKinds};
pub use pipeline::{PreparedRender, RenderRequest, validate_blueprint};
pub use registry::{RegistryClient, RegistryOptions};
pub use render::{RenderInput, RenderOutput, RenderState, Renderer};
pub use resolver::{ComponentResolver, DescriptorTable, LayeredResolver};
pub use schema::{JsonSchemaNode, SchemaLoader, SchemaResolver};
pub use template::{GoTemplateEngine, TemplateEngine};
pub use vfs::OverlayFs;
