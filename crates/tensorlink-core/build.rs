//! Build script for tensorlink-core.
//!
//! Compiles the prediction and training service definitions into Rust code.
//!
//! Note: Build scripts require `println!` for cargo integration,
//! so we allow it here.
#![allow(clippy::disallowed_macros)]

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        // Server stubs back the mock services in the integration tests
        .build_server(true)
        .build_client(true)
        // Image payloads are large; keep them as `Bytes` to avoid copies
        .bytes(["."])
        .compile_protos(
            &[
                "proto/tensorflow_serving/apis/prediction_service.proto",
                "proto/image/training.proto",
            ],
            &["proto/"],
        )?;

    println!("cargo:rerun-if-changed=proto/");

    Ok(())
}
