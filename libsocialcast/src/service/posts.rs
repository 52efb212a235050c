//! Scheduled post management

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::db::{Database, PostFilter};
use crate::error::{Result, SocialcastError};
use crate::media::MediaResolver;
use crate::processor::PostProcessor;
use crate::types::{NewScheduledPost, PostStatus, PostType, ScheduledPost};

/// Caller-editable fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub caption: Option<String>,
    pub target_id: Option<String>,
    pub scheduled_time: Option<i64>,
    /// Replacement media file; the previous one is deleted
    pub media_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PostStats {
    pub total: i64,
    pub pending: i64,
    pub posted: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Clone)]
pub struct PostService {
    db: Database,
    processor: PostProcessor,
    media: MediaResolver,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(
        db: Database,
        processor: PostProcessor,
        media: MediaResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            processor,
            media,
            clock,
        }
    }

    pub async fn create(&self, new: NewScheduledPost) -> Result<ScheduledPost> {
        if new.post_type == PostType::Text && new.content.caption.trim().is_empty() {
            return Err(SocialcastError::InvalidInput(
                "Text posts need a caption".to_string(),
            ));
        }

        let post = ScheduledPost::from_new(new, self.clock.now());
        self.db.create_post(&post).await?;
        tracing::info!(
            post_id = %post.id,
            platform = %post.platform,
            scheduled_time = post.scheduled_time,
            "Scheduled post"
        );
        Ok(post)
    }

    pub async fn get(&self, post_id: &str) -> Result<ScheduledPost> {
        self.db
            .get_post(post_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("post {}", post_id)))
    }

    /// Posts matching `filter`, earliest scheduled first
    pub async fn list(&self, filter: &PostFilter) -> Result<Vec<ScheduledPost>> {
        self.db.list_posts(filter).await
    }

    /// Edit a post that has not been published
    pub async fn update(&self, post_id: &str, update: PostUpdate) -> Result<ScheduledPost> {
        let mut post = self.get(post_id).await?;
        if post.status == PostStatus::Posted {
            return Err(SocialcastError::InvalidInput(
                "Published posts cannot be edited".to_string(),
            ));
        }

        if let Some(caption) = update.caption {
            post.content.caption = caption;
        }
        if let Some(target_id) = update.target_id {
            post.target_id = Some(target_id);
        }
        if let Some(scheduled_time) = update.scheduled_time {
            post.scheduled_time = scheduled_time;
        }
        let stored_status = post.status;
        let old_media = post.content.media_path.clone();
        if let Some(media_path) = update.media_path {
            post.content.media_path = Some(media_path);
        }

        post.updated_at = self.clock.now();
        if !self
            .db
            .update_post_content(&post, stored_status, old_media.as_deref())
            .await?
        {
            return Err(busy(post_id));
        }

        // The record no longer points at the old file, and only we detached it
        if let Some(old) = old_media.as_deref() {
            if post.content.media_path.as_deref() != Some(old) {
                self.media.remove(old)?;
            }
        }
        Ok(post)
    }

    /// Move a post to a new time and queue it again.
    ///
    /// A failed post becomes pending so the scanner picks it up; this is the
    /// only way a failed post is retried.
    pub async fn reschedule(&self, post_id: &str, scheduled_time: i64) -> Result<ScheduledPost> {
        let mut post = self.get(post_id).await?;
        if post.status == PostStatus::Posted {
            return Err(SocialcastError::InvalidInput(
                "Published posts cannot be rescheduled".to_string(),
            ));
        }

        let stored_status = post.status;
        post.scheduled_time = scheduled_time;
        post.status = PostStatus::Pending;
        post.updated_at = self.clock.now();
        if !self
            .db
            .update_post_content(&post, stored_status, post.content.media_path.as_deref())
            .await?
        {
            return Err(busy(post_id));
        }
        tracing::info!(post_id = %post.id, scheduled_time, "Rescheduled post");
        Ok(post)
    }

    pub async fn cancel(&self, post_id: &str) -> Result<()> {
        let cancelled = self
            .db
            .transition_post(
                post_id,
                PostStatus::Pending,
                PostStatus::Cancelled,
                self.clock.now(),
            )
            .await?;
        if cancelled {
            return Ok(());
        }

        let post = self.get(post_id).await?;
        if post.status == PostStatus::Pending {
            return Err(busy(post_id));
        }
        Err(SocialcastError::InvalidInput(format!(
            "Post is {}; only pending posts can be cancelled",
            post.status
        )))
    }

    /// Remove a post and its media file
    pub async fn delete(&self, post_id: &str) -> Result<()> {
        let post = self.get(post_id).await?;
        let media = post.content.media_path.as_deref();
        if !self.db.delete_post(post_id, media, self.clock.now()).await? {
            return Err(busy(post_id));
        }
        if let Some(path) = media {
            self.media.remove(path)?;
        }
        tracing::info!(post_id = %post_id, "Deleted post");
        Ok(())
    }

    /// Publish immediately; rejected once the post is published
    pub async fn post_now(&self, post_id: &str) -> Result<ScheduledPost> {
        self.processor.post_now(post_id).await
    }

    pub async fn stats(&self, user_id: Option<&str>) -> Result<PostStats> {
        let mut stats = PostStats::default();
        for (status, n) in self.db.post_status_counts(user_id).await? {
            stats.total += n;
            match status {
                PostStatus::Pending => stats.pending = n,
                PostStatus::Posted => stats.posted = n,
                PostStatus::Failed => stats.failed = n,
                PostStatus::Cancelled => stats.cancelled = n,
            }
        }
        Ok(stats)
    }
}

/// The stored post moved under us: a processor holds it or another edit won
fn busy(post_id: &str) -> SocialcastError {
    SocialcastError::InvalidInput(format!(
        "Post {} is being published or was changed; try again",
        post_id
    ))
}
