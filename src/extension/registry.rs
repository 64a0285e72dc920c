//! 扩展注册表
//!
//! 保存已安装扩展及其注册顺序。解析器按这里的顺序遍历扩展，
//! 顺序来自配置，不做字母排序。

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::extension::manifest::Extension;
use crate::extension::parser::ManifestParser;
use crate::utils::{CoreError, Result};

/// 扩展目录中的清单文件名
const MANIFEST_FILENAMES: [&str; 2] = ["manifest.yaml", "manifest.json"];

/// 扩展注册表
///
/// 启动时构建，之后以 `Arc` 共享、只读访问。
#[derive(Debug, Default, Clone)]
pub struct ExtensionRegistry {
    extensions: IndexMap<String, Arc<Extension>>,
}

impl ExtensionRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 按给定顺序注册一组扩展
    pub fn from_extensions(extensions: impl IntoIterator<Item = Extension>) -> Result<Self> {
        let mut registry = Self::new();
        for extension in extensions {
            registry.register(extension)?;
        }
        Ok(registry)
    }

    /// 注册扩展（追加到顺序末尾）
    ///
    /// # Errors
    ///
    /// - 清单校验失败
    /// - 扩展 ID 已注册
    pub fn register(&mut self, extension: Extension) -> Result<()> {
        ManifestParser::validate(&extension)?;
        if self.extensions.contains_key(&extension.id) {
            return Err(CoreError::ExtensionAlreadyRegistered(extension.id));
        }
        tracing::info!(
            extension = %extension.id,
            routes = extension.routes.len(),
            enabled = extension.enabled,
            "注册扩展"
        );
        self.extensions.insert(extension.id.clone(), Arc::new(extension));
        Ok(())
    }

    /// 扫描目录，注册每个包含清单文件的子目录
    ///
    /// 子目录按名称排序后注册，保证跨平台顺序稳定。解析失败的扩展记录警告并跳过。
    pub async fn scan(&mut self, dir: &Path) -> Result<Vec<String>> {
        let mut registered = Vec::new();
        if !dir.exists() {
            tracing::debug!("扩展目录不存在，跳过: {:?}", dir);
            return Ok(registered);
        }

        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(manifest) = MANIFEST_FILENAMES
                .iter()
                .map(|name| path.join(name))
                .find(|candidate| candidate.exists())
            else {
                tracing::trace!("目录 {:?} 中未找到扩展清单，跳过", path);
                continue;
            };

            match ManifestParser::parse_file(&manifest).await {
                Ok(extension) => {
                    let id = extension.id.clone();
                    match self.register(extension) {
                        Ok(()) => registered.push(id),
                        Err(e) => tracing::warn!("注册扩展失败 {:?}: {}", path, e),
                    }
                }
                Err(e) => tracing::warn!("解析扩展清单失败 {:?}: {}", manifest, e),
            }
        }

        Ok(registered)
    }

    /// 获取扩展
    pub fn get(&self, id: &str) -> Option<Arc<Extension>> {
        self.extensions.get(id).cloned()
    }

    /// 获取扩展，不存在时返回错误
    pub fn require(&self, id: &str) -> Result<Arc<Extension>> {
        self.get(id)
            .ok_or_else(|| CoreError::ExtensionNotFound(id.to_string()))
    }

    /// 已安装（启用）扩展的 ID，按注册顺序
    pub fn installed_ids(&self) -> Vec<String> {
        self.installed().map(|ext| ext.id.clone()).collect()
    }

    /// 已安装（启用）扩展，按注册顺序
    pub fn installed(&self) -> impl Iterator<Item = &Arc<Extension>> {
        self.extensions.values().filter(|ext| ext.enabled)
    }

    /// 是否已注册
    pub fn contains(&self, id: &str) -> bool {
        self.extensions.contains_key(id)
    }

    /// 已注册扩展数量（含未启用）
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
