//! 扩展清单解析器
//!
//! 负责从 manifest.yaml / manifest.json 解析并校验扩展清单。

use std::path::Path;

use crate::extension::manifest::Extension;
use crate::utils::{CoreError, Result};

/// 扩展清单解析器
#[derive(Debug, Clone, Default)]
pub struct ManifestParser;

impl ManifestParser {
    /// 从文件解析扩展清单
    ///
    /// `.json` 后缀按 JSON 解析，其余按 YAML 解析。
    pub async fn parse_file(path: &Path) -> Result<Extension> {
        let content = tokio::fs::read_to_string(path).await?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Self::parse_json(&content)
        } else {
            Self::parse_string(&content)
        }
    }

    /// 从 YAML 字符串解析扩展清单
    pub fn parse_string(content: &str) -> Result<Extension> {
        let extension: Extension = serde_yaml::from_str(content)?;
        Self::validate(&extension)?;
        Ok(extension)
    }

    /// 从 JSON 字符串解析扩展清单
    pub fn parse_json(content: &str) -> Result<Extension> {
        let extension: Extension = serde_json::from_str(content)?;
        Self::validate(&extension)?;
        Ok(extension)
    }

    /// 校验扩展清单
    ///
    /// 只做结构校验：ID 格式、版本号、路由 ID 非空。路由 `class` 的合法性
    /// 在构建路由表时检查，以便按配置策略回退到旧式路由。
    pub fn validate(extension: &Extension) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if extension.id.is_empty() {
            errors.push("扩展 ID 不能为空".to_string());
        } else if !Self::is_valid_extension_id(&extension.id) {
            errors.push(format!(
                "扩展 ID '{}' 格式无效，只允许字母、数字和下划线",
                extension.id
            ));
        }

        if let Some(ref version) = extension.version {
            if let Err(e) = semver::Version::parse(version) {
                errors.push(format!("无效的版本号 '{}': {}", version, e));
            }
        }

        for route_id in extension.routes.keys() {
            if route_id.trim_matches('/').is_empty() {
                errors.push(format!("扩展 '{}' 存在空的路由 ID", extension.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidManifest(errors.join("; ")))
        }
    }

    /// 扩展 ID 只允许 ASCII 字母、数字和下划线
    pub fn is_valid_extension_id(id: &str) -> bool {
        !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_valid_manifest() {
        let ext = ManifestParser::parse_string(
            r#"
id: taoQtiTest
version: "1.2.0"
routes:
  /taoQtiTest: "oat::taoQtiTest::controller"
"#,
        )
        .unwrap();
        assert_eq!(ext.id, "taoQtiTest");
        assert_eq!(ext.routes.len(), 1);
    }

    #[test]
    fn test_reject_invalid_id_and_version() {
        let err = ManifestParser::parse_string("id: \"tao-items\"\nversion: \"abc\"\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("tao-items"));
        assert!(message.contains("abc"));
    }

    #[test]
    fn test_reject_empty_route_id() {
        let err = ManifestParser::parse_string("id: tao\nroutes:\n  /: \"oat::tao\"\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidManifest(_)));
    }

    #[tokio::test]
    async fn test_parse_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, r#"{"id": "taoItems", "routes": {"/taoItems": "oat::taoItems"}}"#)
            .await
            .unwrap();

        let ext = ManifestParser::parse_file(&path).await.unwrap();
        assert_eq!(ext.id, "taoItems");
    }
}
