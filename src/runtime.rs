use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::LinkPipeline;
use crate::resolver::{HttpLinkResolver, LinkResolver};
use crate::session::{SessionController, WsConnector};

pub struct BridgeRuntime {
    config: Config,
}

impl BridgeRuntime {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let groups = self.config.enabled_groups();
        if groups.is_empty() {
            warn!("no enabled groups configured; every message will be ignored");
        }
        info!(
            "starting bridge (gateway={}, groups={}, bv_mode={}, share_text={}, text_reply_mode={:?}, token={})",
            self.config.gateway.url,
            groups.len(),
            self.config.bilibili.enable_bv_mode,
            self.config.bilibili.enable_share_text_parser,
            self.config.bilibili.text_share_reply_mode,
            self.config.gateway.bearer_token().is_some()
        );

        let resolver: Arc<dyn LinkResolver> =
            Arc::new(HttpLinkResolver::new(&self.config.bridge).map_err(|err| anyhow!(err))?);
        let pipeline = Arc::new(LinkPipeline::new(&self.config, resolver));
        let connector = Arc::new(WsConnector::new(
            &self.config.gateway,
            self.config.bridge.event_queue_capacity,
        ));
        let session = SessionController::new(connector, pipeline, &self.config.bridge);
        let state = session.subscribe();

        tokio::select! {
            _ = session.run_forever() => Ok(()),
            _ = signal::ctrl_c() => {
                info!("received ctrl-c, shutting down (session={:?})", *state.borrow());
                Ok(())
            }
        }
    }
}
