use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Undetermined => "undetermined",
        }
    }
}

/// Where the runtime's notification permission comes from. Querying is
/// cheap and synchronous; requesting may involve a user prompt and is
/// therefore async.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    fn query(&self) -> PermissionStatus;
    async fn request(&self) -> PermissionStatus;
}

/// A single notification handed to the delivery surface. The tag matches
/// the armed trigger's composite key so the surface can collapse
/// duplicate deliveries for the same slot and lead time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub require_interaction: bool,
}

/// Fire-and-forget delivery surface.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: Notification);
}

/// Permission source with a fixed answer, settable up front. `request`
/// resolves to the configured answer, mimicking a user responding to the
/// prompt the same way every time.
#[derive(Debug)]
pub struct InMemoryPermissionSource {
    status: Mutex<PermissionStatus>,
    request_answer: PermissionStatus,
}

impl InMemoryPermissionSource {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
            request_answer: status,
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionStatus::Denied)
    }

    /// Starts undetermined; a request resolves to `answer` and sticks.
    pub fn undetermined_resolving_to(answer: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(PermissionStatus::Undetermined),
            request_answer: answer,
        }
    }
}

impl Default for InMemoryPermissionSource {
    fn default() -> Self {
        Self::new(PermissionStatus::Undetermined)
    }
}

#[async_trait]
impl PermissionSource for InMemoryPermissionSource {
    fn query(&self) -> PermissionStatus {
        self.status
            .lock()
            .map(|status| *status)
            .unwrap_or(PermissionStatus::Denied)
    }

    async fn request(&self) -> PermissionStatus {
        if let Ok(mut status) = self.status.lock() {
            if *status == PermissionStatus::Undetermined {
                *status = self.request_answer;
            }
            *status
        } else {
            PermissionStatus::Denied
        }
    }
}

/// Records everything delivered; the assertion surface for scheduler and
/// command tests.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    delivered: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn deliver(&self, notification: Notification) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification);
        }
    }
}
