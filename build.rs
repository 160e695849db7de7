// build.rs
//
// Generates the gRPC client and server stubs for the metric service. The
// message types are hand-written prost structs in `src/rpc/proto.rs`, so the
// service is described manually and no protoc invocation is needed.

use tonic_build::manual::{Builder, Method, Service};

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::rpc::proto::{}", input))
        .output_type(format!("crate::rpc::proto::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let service = Service::builder()
        .name("Metrics")
        .package("metric")
        .method(method("updates", "Updates", "UpdatesRequest", "UpdatesResponse"))
        .method(method("update", "Update", "Metric", "Metric"))
        .method(method("value", "Value", "Metric", "Metric"))
        .method(method("list", "List", "ListRequest", "ListResponse"))
        .method(method("ping", "Ping", "PingRequest", "PingResponse"))
        .build();

    Builder::new().compile(&[service]);
}
