//! 配置模块，负责加载JSON配置文件

use crate::ast::GroupKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    Missing(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// 本地存储配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub namespace: String,
    pub version: u32,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "query-builder".to_string(),
            version: 1,
            path: PathBuf::from(".query-builder/store.json"),
        }
    }
}

/// 查询构建器配置，缺失的字段取默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// 删除节点后是否一并删除变空的祖先组
    pub prune_empty_groups: bool,
    /// 根组以及拖放合并时新建组的类型
    pub default_kind: GroupKind,
    /// 新节点id的前缀
    pub id_prefix: String,
    pub storage: StorageConfig,
    /// 字段元数据JSON文件
    pub fields_path: Option<PathBuf>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            prune_empty_groups: false,
            default_kind: GroupKind::And,
            id_prefix: "node-".to_string(),
            storage: StorageConfig::default(),
            fields_path: None,
        }
    }
}

impl BuilderConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::Missing(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// 加载配置，失败时使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "使用默认配置");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
            "prune_empty_groups": true,
            "default_kind": "OR",
            "storage": {{ "version": 3 }},
            "fields_path": "fields.json"
        }}"#
        )
        .unwrap();

        let config = BuilderConfig::from_json_file(file.path()).unwrap();
        assert!(config.prune_empty_groups);
        assert_eq!(config.default_kind, GroupKind::Or);
        assert_eq!(config.id_prefix, "node-");
        assert_eq!(config.storage.version, 3);
        assert_eq!(config.storage.namespace, "query-builder");
        assert_eq!(config.fields_path, Some(PathBuf::from("fields.json")));
    }

    #[test]
    fn test_invalid_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = BuilderConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = BuilderConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::Missing(_))));
        assert_eq!(BuilderConfig::load_or_default("non_existent_file.json"), BuilderConfig::default());
    }

    #[test]
    fn test_default_config() {
        let config = BuilderConfig::default();
        assert!(!config.prune_empty_groups);
        assert_eq!(config.default_kind, GroupKind::And);
        assert_eq!(config.storage.namespace, "query-builder");
        assert_eq!(config.storage.version, 1);
        assert!(config.fields_path.is_none());
    }
}
