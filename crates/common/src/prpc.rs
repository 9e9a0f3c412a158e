//! pRPC 风格的 HTTP/JSON 请求处理
//!
//! 每个 RPC 方法映射为 `POST /prpc/{package.Service}/{Method}`，请求与响应都是
//! JSON。错误以 `tonic::Status` 表达，转换为对应的 HTTP 状态码，并在
//! `X-Prpc-Grpc-Code` 头中携带原始 gRPC 状态码。
//!
//! 身份认证由外部中间件完成，这里只从 `x-fleet-identity` 头读取调用方身份。

use std::future::Future;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tonic::{Code, Status};
use tracing::{debug, error, warn};

use crate::error::DatastoreError;
use crate::metrics::RpcTimer;

/// 调用方身份请求头
pub const IDENTITY_HEADER: &str = "x-fleet-identity";

/// gRPC 状态码响应头
pub const GRPC_CODE_HEADER: &str = "x-prpc-grpc-code";

/// 匿名身份
pub const ANONYMOUS_IDENTITY: &str = "anonymous:anonymous";

/// RPC 方法路径
pub fn method_path(service: &str, method: &str) -> String {
    format!("/prpc/{service}/{method}")
}

/// 调用方身份，形如 `user:someone@example.com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    identity: String,
}

impl Caller {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_IDENTITY)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity == ANONYMOUS_IDENTITY
    }

    /// `user:` 身份对应的邮箱
    pub fn email(&self) -> Option<&str> {
        self.identity.strip_prefix("user:")
    }

    fn is_well_formed(identity: &str) -> bool {
        matches!(
            identity.split_once(':'),
            Some((kind, value))
                if !value.is_empty()
                    && matches!(kind, "user" | "service" | "anonymous" | "bot" | "project")
        )
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = PrpcError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDENTITY_HEADER) else {
            return Ok(Caller::anonymous());
        };
        let identity = value
            .to_str()
            .map_err(|_| Status::unauthenticated("identity header is not valid ASCII"))?
            .trim();
        if !Caller::is_well_formed(identity) {
            return Err(Status::unauthenticated(format!("bad identity {identity:?}")).into());
        }
        Ok(Caller::new(identity))
    }
}

/// pRPC 错误响应
#[derive(Debug)]
pub struct PrpcError(pub Status);

impl PrpcError {
    pub fn status(&self) -> &Status {
        &self.0
    }
}

impl From<Status> for PrpcError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl From<DatastoreError> for PrpcError {
    fn from(err: DatastoreError) -> Self {
        Self(err.into())
    }
}

impl From<JsonRejection> for PrpcError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Status::invalid_argument(format!(
            "could not decode request body: {}",
            rejection.body_text()
        )))
    }
}

/// gRPC 状态码到 HTTP 状态码的映射
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for PrpcError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = http_status(code);

        let message = if status.is_server_error() {
            // 不向客户端暴露内部错误详情
            error!("Internal error: {:?}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.message().to_string()
        };

        let body = Json(json!({
            "code": code as i32,
            "codeName": format!("{code:?}"),
            "message": message,
        }));

        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(GRPC_CODE_HEADER, HeaderValue::from(code as i32));
        response
    }
}

/// JSON 请求体，解码失败时返回 `INVALID_ARGUMENT`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(PrpcError))]
pub struct PrpcRequest<T>(pub T);

/// pRPC 处理器返回类型
pub type PrpcResult<T> = Result<Json<T>, PrpcError>;

/// 执行 RPC 处理逻辑并记录日志与指标
pub async fn handle<T, F>(service: &'static str, method: &'static str, fut: F) -> PrpcResult<T>
where
    F: Future<Output = Result<T, Status>>,
{
    let timer = RpcTimer::new(service, method);
    let result = fut.await;
    match &result {
        Ok(_) => {
            timer.observe(Code::Ok);
            debug!(service, method, "rpc succeeded");
        }
        Err(status) => {
            timer.observe(status.code());
            warn!(
                service,
                method,
                code = ?status.code(),
                message = status.message(),
                "rpc failed"
            );
        }
    }
    result.map(Json).map_err(PrpcError)
}
