fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Source a protoc binary if one is not already present in the environment.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Only rerun if proto files change
    println!("cargo:rerun-if-changed=proto/boxoffice/boxoffice.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/boxoffice/boxoffice.proto"], &["proto"])?;
    Ok(())
}
