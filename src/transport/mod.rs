//! 传输层：共享的 reqwest 客户端，负责发送提供商请求并对传输失败进行分类。

pub mod http;

pub use http::HttpTransport;
