fn main() {
	// Use vendored protoc from protoc-bin-vendored
	std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().expect("vendored protoc"));

	tonic_prost_build::configure()
		.build_server(true)
		.build_client(true)
		.compile_protos(&["proto/overlay.proto"], &["proto/"])
		.unwrap_or_else(|e| panic!("Failed to compile protos: {e}"));

	println!("cargo:rerun-if-changed=proto/");
}
