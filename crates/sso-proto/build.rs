// Generates the `auth` gRPC bindings from proto/sso.proto

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Vendored protoc, no system install required
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/sso.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/");
    Ok(())
}
