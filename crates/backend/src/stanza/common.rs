use serde_json::json;
use wharf_types::{CommonParams, ConfigFragment};

use super::{StanzaGenerator, StanzaKind, fragment};

/// Engine-wide server, concurrency and call-caching settings.
#[derive(Debug, Clone, Copy)]
pub struct CommonStanza<'a> {
    params: &'a CommonParams,
}

impl<'a> CommonStanza<'a> {
    pub fn new(params: &'a CommonParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for CommonStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Common
    }

    fn generate(&self) -> ConfigFragment {
        fragment(json!({
            "backend": {
                "default": "Local"
            },
            "webservice": {
                "port": self.params.port
            },
            "services": {
                "LoadController": {
                    "class": "cromwell.services.loadcontroller.impl.LoadControllerServiceActor",
                    "config": {
                        "control-frequency": "21474834 seconds"
                    }
                }
            },
            "system": {
                "job-rate-control": {
                    "jobs": 1,
                    "per": "2 seconds"
                },
                "abort-jobs-on-terminate": true,
                "graceful-server-shutdown": true,
                "max-concurrent-workflows": self.params.max_concurrent_workflows
            },
            "call-caching": {
                "enabled": !self.params.disable_call_caching,
                "invalidate-bad-cache-results": true
            }
        }))
    }
}
