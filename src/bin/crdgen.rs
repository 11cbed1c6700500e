// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `apisix.apache.org` CRD YAML files from the Rust types in
//! `src/crd/`. Gateway API CRDs are published upstream and are not generated.
//!
//! Usage:
//!   cargo run --bin crdgen
//!
//! Generated files will be written to deploy/crds/ with proper headers.

use apisix_ingress::crd::{
    ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls,
    ApisixUpstream, BackendTrafficPolicy, GatewayProxy, HTTPRoutePolicy, PluginConfig,
};
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd/
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML files from src/crd/...");

    generate_crd::<ApisixRoute>("apisixroutes.crd.yaml", output_dir)?;
    generate_crd::<ApisixUpstream>("apisixupstreams.crd.yaml", output_dir)?;
    generate_crd::<ApisixTls>("apisixtlses.crd.yaml", output_dir)?;
    generate_crd::<ApisixConsumer>("apisixconsumers.crd.yaml", output_dir)?;
    generate_crd::<ApisixPluginConfig>("apisixpluginconfigs.crd.yaml", output_dir)?;
    generate_crd::<ApisixClusterConfig>("apisixclusterconfigs.crd.yaml", output_dir)?;
    generate_crd::<PluginConfig>("pluginconfigs.crd.yaml", output_dir)?;
    generate_crd::<HTTPRoutePolicy>("httproutepolicies.crd.yaml", output_dir)?;
    generate_crd::<BackendTrafficPolicy>("backendtrafficpolicies.crd.yaml", output_dir)?;
    generate_crd::<GatewayProxy>("gatewayproxies.crd.yaml", output_dir)?;

    println!("✓ Successfully generated CRD YAML files in deploy/crds/");
    println!("\nNext steps:");
    println!("  1. Review the generated files");
    println!("  2. Install the Gateway API CRDs from the upstream release");
    println!("  3. Deploy with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<(), Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let yaml = serde_yaml::to_string(&T::crd())?;
    let content = format!("{COPYRIGHT_HEADER}{yaml}");

    let output_path = output_dir.join(filename);
    fs::write(&output_path, content)?;

    println!("  ✓ Generated {filename}");

    Ok(())
}
