//! In-memory video store used by tests and by `VIDEOS_STORE=memory`.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::query::VideoFilter;
use crate::repository::{StoreError, StoreResult, VideoRepository};
use crate::video::{Video, VideoInput};

#[derive(Debug, Default)]
pub struct MemoryVideoStore {
    videos: RwLock<HashMap<String, Video>>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.videos.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VideoRepository for MemoryVideoStore {
    fn create(&self, video: &Video) -> StoreResult<()> {
        let mut videos = self.videos.write();
        if videos.contains_key(&video.id) {
            return Err(StoreError::Conflict(video.id.clone()));
        }
        videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    fn update(&self, id: &str, input: &VideoInput) -> StoreResult<Video> {
        let mut videos = self.videos.write();
        let video = videos
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        video.apply(input.clone());
        Ok(video.clone())
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.videos
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    fn list(&self, filter: &VideoFilter) -> StoreResult<(Vec<Video>, u64)> {
        let videos = self.videos.read();
        let mut matching: Vec<&Video> = videos
            .values()
            .filter(|video| filter.matches(video))
            .collect();
        matching.sort_by(|a, b| filter.compare(a, b));

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit()).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::contract;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn satisfies_repository_contract() {
        contract::run_all(MemoryVideoStore::new);
    }

    #[test]
    fn stores_are_isolated() {
        let first = MemoryVideoStore::new();
        let second = MemoryVideoStore::new();
        let video = Video::from_input(
            "only-here",
            VideoInput {
                title: "t".into(),
                cover_url: "u".into(),
                length: "1:00".into(),
                author: json!({}),
                stats: json!({"likes": 1}),
                created_at: None,
            },
            Utc::now(),
        );
        first.create(&video).unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
