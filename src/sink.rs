//! Contracts for delivery backends.
//!
//! A sink receives a finished [`Epub`], a complete byte buffer of known
//! length plus its title, and delivers it somewhere: a cloud reader, a
//! Dropbox folder, a send-to-Kindle address. Sinks declare the payload as
//! [`crate::EPUB_MIME_TYPE`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::Epub;

/// Cap on a single delivery operation.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// A delivery destination for packaged articles.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, epub: &Epub) -> Result<()>;
}

/// Replace characters that upload targets commonly reject in filenames.
pub fn clean_filename(name: &str) -> String {
    name.replace([':', '?', '"', '\\', '|', '/'], "_")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_clean_filename() {
        assert_eq!(
            clean_filename(r#"Q: what? "a\b|c/d""#),
            "Q_ what_ _a_b_c_d_"
        );
        assert_eq!(clean_filename("plain title"), "plain title");
    }

    struct MemorySink {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sink for MemorySink {
        async fn deliver(&self, epub: &Epub) -> Result<()> {
            self.delivered
                .lock()
                .unwrap()
                .push(format!("{}.epub", clean_filename(&epub.title)));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_receives_package() {
        let sink = MemorySink {
            delivered: Mutex::new(Vec::new()),
        };
        let epub = Epub {
            id: "id".to_string(),
            title: "a/b: c".to_string(),
            data: vec![1, 2, 3],
        };
        sink.deliver(&epub).await.unwrap();
        assert_eq!(
            sink.delivered.lock().unwrap().as_slice(),
            ["a_b_ c.epub".to_string()]
        );
    }
}
