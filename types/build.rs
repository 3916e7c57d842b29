fn main() {
    println!("cargo:rerun-if-changed=proto/store.proto");
    tonic_prost_build::configure()
        .compile_protos(&["proto/store.proto"], &["proto/"])
        .expect("Failed to compile proto/store.proto");
}
