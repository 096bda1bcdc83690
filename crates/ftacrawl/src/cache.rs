use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn html_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{}-download.html", key))
    }

    fn children_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{}-getChildren.json", key))
    }

    async fn read_optional(path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, contents).await
    }

    pub async fn read_html(&self, key: u64) -> io::Result<Option<String>> {
        Ok(Self::read_optional(&self.html_path(key))
            .await?
            .filter(|html| !html.is_empty()))
    }

    pub async fn write_html(&self, key: u64, html: &str) -> io::Result<()> {
        if html.is_empty() {
            return Ok(());
        }
        self.write(&self.html_path(key), html).await
    }

    pub async fn read_children(&self, key: u64) -> io::Result<Option<Vec<Value>>> {
        let Some(text) = Self::read_optional(&self.children_path(key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => Ok(Some(items)),
            Ok(_) => Ok(None),
            Err(e) => {
                log::warn!("Ignoring unreadable cached listing for #{}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn write_children(&self, key: u64, items: &[Value]) -> io::Result<()> {
        let json = serde_json::to_string(items).map_err(io::Error::other)?;
        self.write(&self.children_path(key), &json).await
    }

    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> io::Result<Option<T>> {
        let Some(text) = Self::read_optional(&self.dir.join(name)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&text).ok())
    }

    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<()> {
        let json = serde_json::to_string(value).map_err(io::Error::other)?;
        self.write(&self.dir.join(name), &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_html_round_trip_and_empty_miss() {
        let temp = tempfile::tempdir().unwrap();
        let cache = PageCache::new(temp.path().join("nested"));

        assert_eq!(cache.read_html(7).await.unwrap(), None);

        cache.write_html(7, "").await.unwrap();
        assert_eq!(cache.read_html(7).await.unwrap(), None);

        cache.write_html(7, "<html></html>").await.unwrap();
        assert_eq!(
            cache.read_html(7).await.unwrap().as_deref(),
            Some("<html></html>")
        );
        assert!(temp.path().join("nested/7-download.html").exists());
    }

    #[tokio::test]
    async fn test_children_only_arrays_hit() {
        let temp = tempfile::tempdir().unwrap();
        let cache = PageCache::new(temp.path());

        std::fs::write(temp.path().join("3-getChildren.json"), r#"{"error":"x"}"#).unwrap();
        assert_eq!(cache.read_children(3).await.unwrap(), None);

        std::fs::write(temp.path().join("4-getChildren.json"), "not json").unwrap();
        assert_eq!(cache.read_children(4).await.unwrap(), None);

        let items = vec![json!({"key": 10, "folder": false})];
        cache.write_children(5, &items).await.unwrap();
        assert_eq!(cache.read_children(5).await.unwrap(), Some(items));
    }
}
