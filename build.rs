//! Build script for proto compilation.
//!
//! The access-binding and operation messages are committed in
//! `src/generated.rs`, so this only needs to run when
//! `proto/access_bindings.proto` changes.
//!
//! To regenerate: `cargo build --features regenerate-proto`

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "regenerate-proto")]
    {
        let out_dir = std::path::PathBuf::from("src");
        // Only messages are generated; the client dispatches by method path
        // because every resource kind exposes the same three RPCs.
        tonic_prost_build::configure()
            .build_server(false)
            .build_client(false)
            .out_dir(&out_dir)
            .compile_protos(&["proto/access_bindings.proto"], &["proto"])?;

        let generated = out_dir.join("hemmer.iam.v1.rs");
        let target = out_dir.join("generated.rs");
        if generated.exists() {
            std::fs::rename(generated, target)?;
        }
    }

    println!("cargo:rerun-if-changed=proto/access_bindings.proto");

    Ok(())
}
