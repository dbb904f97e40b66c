//! # SCIM Schema Validator
//!
//! A command-line utility for validating SCIM schema and resource type files
//! with the same loader the silo uses at startup.
//!
//! ## Usage
//!
//! ### Validate a Single Schema File
//!
//! ```bash
//! cargo run --bin schema-validator schemas/Device.json
//! ```
//!
//! ### Validate a Directory of Schemas
//!
//! ```bash
//! cargo run --bin schema-validator ./schemas/
//! ```
//!
//! ### Validate Schemas Together With Resource Types
//!
//! ```bash
//! cargo run --bin schema-validator ./schemas/ ./resourcetypes/
//! ```
//!
//! ## Output Examples
//!
//! ```text
//! Validating schema file: schemas/Device.json
//! ✓ Schema is valid!
//!
//! Schema Summary:
//!   ID: urn:keydap:params:scim:schemas:core:2.0:Device
//!   Name: Device
//!   Attributes: 10
//!   Required attribute names: serialNumber
//!   Unique attribute paths: serialnumber
//! ```
//!
//! ## Validation Rules
//!
//! - Attribute names must match `^[0-9A-Za-z_$-]+$`
//! - Complex attributes must have sub-attributes
//! - Reference attributes must list their reference types
//! - Resource types must name an endpoint and known schemas
//!
//! ## Exit Codes
//!
//! - `0`: Everything is valid
//! - `1`: One or more files are invalid or could not be read

use scim_silo::schema::{AttrType, Schema, SchemaRegistry};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <schema-file-or-directory> [resource-type-directory]", args[0]);
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  {} schemas/Device.json", args[0]);
        eprintln!("  {} ./schemas/", args[0]);
        eprintln!("  {} ./schemas/ ./resourcetypes/", args[0]);
        process::exit(1);
    }

    let path = Path::new(&args[1]);

    if path.is_file() {
        validate_single_file(path);
    } else if path.is_dir() {
        validate_directory(path);
        if let Some(rt_dir) = args.get(2) {
            validate_registry(path, Path::new(rt_dir));
        }
    } else {
        eprintln!("Error: '{}' is not a valid file or directory", path.display());
        process::exit(1);
    }
}

fn validate_single_file(file_path: &Path) {
    println!("Validating schema file: {}", file_path.display());

    match load_schema(file_path) {
        Ok(schema) => {
            println!("✓ Schema is valid!");
            print_schema_summary(&schema);
        }
        Err(e) => {
            eprintln!("❌ Schema validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn validate_directory(dir_path: &Path) {
    println!("Validating schemas in directory: {}", dir_path.display());

    let entries = match fs::read_dir(dir_path) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error reading directory: {}", e);
            process::exit(1);
        }
    };

    let mut valid_count = 0;
    let mut error_count = 0;
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("\nValidating: {}", file_name);

        match load_schema(&path) {
            Ok(schema) => {
                println!("  ✓ Valid - {} ({})", schema.name, schema.id);
                valid_count += 1;
            }
            Err(e) => {
                eprintln!("  ❌ Invalid - {}", e);
                error_count += 1;
            }
        }
    }

    println!("\nValidation Summary:");
    println!("  Valid schemas: {}", valid_count);
    println!("  Invalid schemas: {}", error_count);

    if error_count > 0 {
        process::exit(1);
    }
}

fn validate_registry(schema_dir: &Path, rt_dir: &Path) {
    println!("\nTesting schema registry loading with resource types from {}...", rt_dir.display());
    match SchemaRegistry::from_dirs(schema_dir, rt_dir) {
        Ok(registry) => {
            println!("✓ Schema registry loaded successfully");
            for rt in registry.resource_types() {
                let extensions: Vec<&str> = rt.schema_extensions.iter().map(|e| e.schema.as_str()).collect();
                println!("    - {} at {} ({})", rt.name, rt.endpoint, rt.schema);
                if !extensions.is_empty() {
                    println!("      extensions: {}", extensions.join(", "));
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to load schema registry: {}", e);
            process::exit(1);
        }
    }
}

fn load_schema(file_path: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file_path)?;
    Ok(Schema::parse(&content)?)
}

fn print_schema_summary(schema: &Schema) {
    println!();
    println!("Schema Summary:");
    println!("  ID: {}", schema.id);
    println!("  Name: {}", schema.name);
    println!("  Description: {}", schema.description);
    println!("  Attributes: {}", schema.attributes.len());

    let mut type_counts = BTreeMap::new();
    for attr in &schema.attributes {
        *type_counts.entry(attr.attr_type.as_str()).or_insert(0) += 1;
    }
    let multi_valued_count = schema.attributes.iter().filter(|attr| attr.multi_valued).count();

    println!("  Multi-valued attributes: {}", multi_valued_count);
    println!("  Attribute types:");
    for (attr_type, count) in type_counts {
        println!("    - {}: {}", attr_type, count);
    }

    let required: Vec<&str> = schema
        .attributes
        .iter()
        .filter(|attr| attr.required)
        .map(|attr: &AttrType| attr.name.as_str())
        .collect();
    if !required.is_empty() {
        println!("  Required attribute names: {}", required.join(", "));
    }
    if !schema.unique_ats.is_empty() {
        let unique: Vec<&str> = schema.unique_ats.iter().map(String::as_str).collect();
        println!("  Unique attribute paths: {}", unique.join(", "));
    }
}
