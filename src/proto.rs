//! Generated protobuf messages and gRPC stubs of the `overlay` package.
#![allow(clippy::all, clippy::pedantic, clippy::nursery)]

tonic::include_proto!("overlay");
