fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = prost_build::Config::new();
    // Fall back to the vendored protoc when the host does not provide one.
    if std::env::var_os("PROTOC").is_none() {
        config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure().compile_protos_with_config(
        config,
        &["proto/raft_transport.proto"],
        &["proto"],
    )?;
    Ok(())
}
