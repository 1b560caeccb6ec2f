use std::time::Duration;

use anyhow::{Context, Error};
use ndarray::{ArrayD, IxDyn};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use crate::triton_client::client::triton::{ModelInferRequest, ModelInferResponse};

/// The subset of the KServe v2 `inference` protocol used by the detectors.
///
/// Field tags follow `protobuf/grpc_service.proto` of
/// `triton-inference-server/common` (branch `r24.08`); fields not listed here
/// are skipped on decode.
pub mod triton {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InferTensorContents {
        #[prost(bool, repeated, tag = "1")]
        pub bool_contents: Vec<bool>,
        #[prost(int32, repeated, tag = "2")]
        pub int_contents: Vec<i32>,
        #[prost(int64, repeated, tag = "3")]
        pub int64_contents: Vec<i64>,
        #[prost(uint32, repeated, tag = "4")]
        pub uint_contents: Vec<u32>,
        #[prost(uint64, repeated, tag = "5")]
        pub uint64_contents: Vec<u64>,
        #[prost(float, repeated, tag = "6")]
        pub fp32_contents: Vec<f32>,
        #[prost(double, repeated, tag = "7")]
        pub fp64_contents: Vec<f64>,
        #[prost(bytes = "vec", repeated, tag = "8")]
        pub bytes_contents: Vec<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ModelInferRequest {
        #[prost(string, tag = "1")]
        pub model_name: String,
        #[prost(string, tag = "2")]
        pub model_version: String,
        #[prost(string, tag = "3")]
        pub id: String,
        #[prost(message, repeated, tag = "5")]
        pub inputs: Vec<model_infer_request::InferInputTensor>,
        #[prost(message, repeated, tag = "6")]
        pub outputs: Vec<model_infer_request::InferRequestedOutputTensor>,
        #[prost(bytes = "vec", repeated, tag = "7")]
        pub raw_input_contents: Vec<Vec<u8>>,
    }

    pub mod model_infer_request {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InferInputTensor {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub datatype: String,
            #[prost(int64, repeated, tag = "3")]
            pub shape: Vec<i64>,
            #[prost(message, optional, tag = "5")]
            pub contents: Option<super::InferTensorContents>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InferRequestedOutputTensor {
            #[prost(string, tag = "1")]
            pub name: String,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ModelInferResponse {
        #[prost(string, tag = "1")]
        pub model_name: String,
        #[prost(string, tag = "2")]
        pub model_version: String,
        #[prost(string, tag = "3")]
        pub id: String,
        #[prost(message, repeated, tag = "5")]
        pub outputs: Vec<model_infer_response::InferOutputTensor>,
        #[prost(bytes = "vec", repeated, tag = "6")]
        pub raw_output_contents: Vec<Vec<u8>>,
    }

    pub mod model_infer_response {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InferOutputTensor {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub datatype: String,
            #[prost(int64, repeated, tag = "3")]
            pub shape: Vec<i64>,
            #[prost(message, optional, tag = "5")]
            pub contents: Option<super::InferTensorContents>,
        }
    }
}

const MODEL_INFER_PATH: &str = "/inference.GRPCInferenceService/ModelInfer";

/// One gRPC channel to a Triton server.
///
/// The channel is closed when the client is dropped, so a client opened inside
/// a detector call lives exactly as long as that call.
#[derive(Debug, Clone)]
pub struct TritonInferenceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl TritonInferenceClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, Error> {
        let channel = Endpoint::from_shared(url.to_string())
            .with_context(|| format!("invalid triton url {url:?}"))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .tcp_nodelay(true)
            .connect()
            .await
            .with_context(|| format!("failed to connect to triton at {url}"))?;

        Ok(TritonInferenceClient {
            inner: tonic::client::Grpc::new(channel),
        })
    }

    pub async fn model_infer(&self, request: ModelInferRequest) -> Result<ModelInferResponse, Error> {
        let model_name = request.model_name.clone();
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| Error::msg(format!("triton channel was not ready: {e}")))?;

        let codec = ProstCodec::<ModelInferRequest, ModelInferResponse>::default();
        let path = PathAndQuery::from_static(MODEL_INFER_PATH);
        let response = grpc
            .unary(tonic::Request::new(request), path, codec)
            .await
            .with_context(|| format!("inference request for model {model_name} failed"))?;

        Ok(response.into_inner())
    }
}

/// Extracts the output tensor `name` as `f32`, from the raw byte buffers when
/// the server sent them and from the typed contents otherwise.
pub fn output_tensor(response: &ModelInferResponse, name: &str) -> Result<ArrayD<f32>, Error> {
    let (index, output) = response
        .outputs
        .iter()
        .enumerate()
        .find(|(_, output)| output.name == name)
        .ok_or_else(|| Error::msg(format!("model {} returned no output {name:?}", response.model_name)))?;

    let dimensions: Vec<usize> = output.shape.iter().map(|&d| d as usize).collect();

    let values: Vec<f32> = match response.raw_output_contents.get(index) {
        Some(raw) => match output.datatype.as_str() {
            "FP32" => u8_to_f32_vec(raw),
            "INT32" => u8_to_i32_vec(raw).into_iter().map(|x| x as f32).collect(),
            other => return Err(Error::msg(format!("unsupported output datatype {other} for {name:?}"))),
        },
        None => match &output.contents {
            Some(contents) if !contents.fp32_contents.is_empty() => contents.fp32_contents.clone(),
            Some(contents) => contents.int_contents.iter().map(|&x| x as f32).collect(),
            None => vec![],
        },
    };

    let arr = ArrayD::from_shape_vec(IxDyn(&dimensions), values)
        .with_context(|| format!("output {name:?} does not match its shape {dimensions:?}"))?;
    Ok(arr)
}

pub fn u8_to_f32_vec(v: &[u8]) -> Vec<f32> {
    v.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn u8_to_i32_vec(v: &[u8]) -> Vec<i32> {
    v.chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
