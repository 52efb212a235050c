//! Scheduled post processing
//!
//! Publishes one due post through its account's session and persists the
//! result. The post is claimed in the store first, so a stale listing, a
//! second processor or a concurrent cancel never yields a second send.
//! Platform failures never escape [`PostProcessor::process_post`];
//! they become a `failed` status with the message stored on the post.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;

use crate::analytics::AnalyticsRecorder;
use crate::clock::Clock;
use crate::db::Database;
use crate::error::{PlatformError, Result, SocialcastError};
use crate::media::MediaResolver;
use crate::service::events::{Event, EventBus};
use crate::session::SessionRegistry;
use crate::tasks::TaskTracker;
use crate::types::{EventType, PlatformKind, PostStatus, PostType, ScheduledPost};

/// Post ids currently being published by this process
#[derive(Default)]
struct InFlight {
    ids: Mutex<HashSet<String>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn begin(self: &Arc<Self>, post_id: &str) -> Option<InFlightGuard> {
        if self.lock().insert(post_id.to_string()) {
            Some(InFlightGuard {
                set: Arc::clone(self),
                post_id: post_id.to_string(),
            })
        } else {
            None
        }
    }
}

struct InFlightGuard {
    set: Arc<InFlight>,
    post_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.post_id);
    }
}

#[derive(Clone)]
pub struct PostProcessor {
    db: Database,
    registry: SessionRegistry,
    media: MediaResolver,
    analytics: AnalyticsRecorder,
    events: EventBus,
    clock: Arc<dyn Clock>,
    in_flight: Arc<InFlight>,
}

impl PostProcessor {
    pub fn new(
        db: Database,
        registry: SessionRegistry,
        media: MediaResolver,
        analytics: AnalyticsRecorder,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            registry,
            media,
            analytics,
            events,
            clock,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Publish a due post and persist the outcome.
    ///
    /// `post` may be a stale listing; the stored row decides. Returns
    /// `Ok(None)` when the post is no longer pending or another processor
    /// holds it. `Err` means the outcome could not be stored.
    pub async fn process_post(&self, post: ScheduledPost) -> Result<Option<ScheduledPost>> {
        self.process_claimed(&post.id, PostStatus::Pending).await
    }

    async fn process_claimed(
        &self,
        post_id: &str,
        expected: PostStatus,
    ) -> Result<Option<ScheduledPost>> {
        let Some(_guard) = self.in_flight.begin(post_id) else {
            tracing::debug!(post_id, "Post already being published here");
            return Ok(None);
        };
        if !self.db.claim_post(post_id, expected, self.clock.now()).await? {
            tracing::debug!(post_id, expected = %expected, "Post changed or claimed elsewhere, skipping");
            return Ok(None);
        }
        // Claimed rows cannot be edited or deleted, so this is what we publish
        let Some(mut post) = self.db.get_post(post_id).await? else {
            return Ok(None);
        };

        tracing::info!(
            post_id = %post.id,
            platform = %post.platform,
            post_type = %post.post_type,
            "Processing scheduled post"
        );

        let outcome = self.publish(&post).await;
        let now = self.clock.now();
        match &outcome {
            Ok(()) => post.mark_posted(now),
            Err(e) => post.mark_failed(e.to_string(), now),
        }
        if !self.db.save_post_outcome(&post, expected).await? {
            tracing::warn!(post_id = %post.id, "Post changed while publishing, outcome dropped");
            return Err(SocialcastError::InvalidInput(format!(
                "post {} changed while it was being published",
                post.id
            )));
        }

        let (event_type, metadata) = match &outcome {
            Ok(()) => {
                tracing::info!(post_id = %post.id, "Post published");
                (
                    EventType::PostPublished,
                    json!({ "platform": post.platform.as_str() }),
                )
            }
            Err(e) => {
                tracing::warn!(
                    post_id = %post.id,
                    retry_count = post.retry_count,
                    error = %e,
                    "Post failed"
                );
                (
                    EventType::PostFailed,
                    json!({ "platform": post.platform.as_str(), "error": e.to_string() }),
                )
            }
        };
        self.analytics
            .record_quietly(&post.user_id, None, Some(&post.id), event_type, Some(metadata))
            .await;
        self.events.emit(Event::PostProcessed {
            post_id: post.id.clone(),
            status: post.status,
            error: post.error_message.clone(),
        });

        Ok(Some(post))
    }

    async fn publish(&self, post: &ScheduledPost) -> Result<()> {
        let caption = post.content.caption.as_str();
        match post.platform {
            PlatformKind::Instagram => {
                let stored = post.content.media_path.as_deref().ok_or_else(|| {
                    PlatformError::Validation("Instagram posts require an image".to_string())
                })?;
                let media = self.media.media_file(stored, post.post_type);
                let session = self.registry.get_session(&post.account_id).await?;
                session.publish_media(&media, caption).await
            }
            PlatformKind::Telegram => {
                let chat_id = post.target_id.as_deref().ok_or_else(|| {
                    PlatformError::Validation("Telegram posts require a target chat id".to_string())
                })?;
                match post.post_type {
                    PostType::Text => {
                        let session = self.registry.get_session(&post.account_id).await?;
                        session.send_text(chat_id, caption).await
                    }
                    PostType::Image | PostType::Video => {
                        let stored = post.content.media_path.as_deref().ok_or_else(|| {
                            PlatformError::Validation(format!(
                                "Telegram {} posts require a media file",
                                post.post_type
                            ))
                        })?;
                        let media = self.media.media_file(stored, post.post_type);
                        let session = self.registry.get_session(&post.account_id).await?;
                        session.send_media(chat_id, &media, caption).await
                    }
                }
            }
            PlatformKind::Facebook | PlatformKind::WhatsApp => {
                tracing::debug!(
                    post_id = %post.id,
                    platform = %post.platform,
                    "No publisher for platform, marking posted"
                );
                Ok(())
            }
        }
    }

    /// Process every due post in turn; returns how many were considered
    pub async fn process_due_posts(&self) -> Result<usize> {
        let due = self.db.find_due_posts(self.clock.now()).await?;
        let count = due.len();
        for post in due {
            let post_id = post.id.clone();
            if let Err(e) = self.process_post(post).await {
                tracing::error!(post_id = %post_id, error = %e, "Post processing aborted");
            }
        }
        Ok(count)
    }

    /// Publish a post immediately, regardless of its scheduled time
    pub async fn post_now(&self, post_id: &str) -> Result<ScheduledPost> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("post {}", post_id)))?;

        if post.status == PostStatus::Posted {
            return Err(SocialcastError::InvalidInput(
                "Post already published".to_string(),
            ));
        }

        self.process_claimed(&post.id, post.status)
            .await?
            .ok_or_else(|| {
                SocialcastError::InvalidInput(format!("post {} is already being published", post_id))
            })
    }

    /// Launch processing without waiting for it
    pub fn spawn(&self, tracker: &TaskTracker, post: ScheduledPost) {
        let processor = self.clone();
        tracker.spawn(async move {
            let post_id = post.id.clone();
            if let Err(e) = processor.process_post(post).await {
                tracing::error!(post_id = %post_id, error = %e, "Post processing aborted");
            }
        });
    }
}
