// src/core/sources.rs

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::error::EnumError;
use crate::core::models::PipelineData;
use crate::core::ports::DataSource;

/// A data source that writes every record it receives as one JSON line.
///
/// Records are queued on an unbounded channel so [`DataSource::request`] never
/// blocks; a writer task serializes them in arrival order. The writer finishes
/// once every handle to the source has been dropped.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    name: String,
    tx: mpsc::UnboundedSender<PipelineData>,
}

impl JsonLinesSource {
    pub fn spawn<W>(name: &str, writer: W) -> (Self, JoinHandle<Result<usize, EnumError>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_lines(rx, writer));
        (
            Self {
                name: name.to_string(),
                tx,
            },
            handle,
        )
    }
}

impl DataSource for JsonLinesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, data: PipelineData) {
        if self.tx.send(data).is_err() {
            warn!(source = %self.name, "Writer has stopped, dropping record.");
        }
    }
}

async fn write_lines<W>(
    mut rx: mpsc::UnboundedReceiver<PipelineData>,
    mut writer: W,
) -> Result<usize, EnumError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(data) = rx.recv().await {
        let mut line = serde_json::to_vec(&data)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        written += 1;
    }
    writer.flush().await?;
    debug!(written, "JSON lines writer finished.");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{SubdomainRequest, Tag};

    #[tokio::test]
    async fn writes_one_line_per_record() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (source, handle) = JsonLinesSource::spawn("stdout", client);

        for times in 1..=2 {
            source.request(PipelineData::Subdomain(SubdomainRequest {
                name: "b.example.com".into(),
                domain: "example.com".into(),
                tag: Tag::Cert,
                source: "crtsh".into(),
                times,
            }));
        }
        drop(source);

        assert_eq!(handle.await.unwrap().unwrap(), 2);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut out)
            .await
            .unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["times"], 2);
        assert_eq!(lines[0]["kind"], "subdomain");
    }
}
