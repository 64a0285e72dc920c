//! 请求 ID 生成

/// 生成 UUID v4 格式的 ID
///
/// 用于分发请求和受保护请求的追踪 ID。
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
