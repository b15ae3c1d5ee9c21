//! Runtime and grid configuration.

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_env::ChannelMesh;

/// Transport settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Receives waiting longer than this fail with a timeout instead of
    /// hanging (`None` waits forever)
    pub recv_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recv_timeout_ms: Some(30_000),
        }
    }
}

impl RuntimeConfig {
    /// Describes an in-memory mesh of `size` ranks with these settings.
    pub fn mesh(&self, size: usize) -> ChannelMesh {
        let mesh = ChannelMesh::new(size);
        match self.recv_timeout_ms {
            Some(ms) => mesh.with_recv_timeout(Duration::from_millis(ms)),
            None => mesh,
        }
    }
}

/// Layout of a shared grid over the process grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Lower corner of the global domain
    pub origin: [f64; 2],

    /// Size of the global domain per axis
    pub extent: [f64; 2],

    /// Processes per axis (x, y)
    pub process_dims: [usize; 2],

    /// Width of the halo exchanged with neighbors
    pub buffer: f64,

    /// Wrap the domain on both axes
    pub periodic: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0],
            extent: [40.0, 60.0],
            process_dims: [2, 2],
            buffer: 2.0,
            periodic: false,
        }
    }
}

impl GridConfig {
    /// Checks the layout against a communicator of `world_size` ranks.
    pub fn validate(&self, world_size: usize) -> Result<()> {
        let expected = self.process_dims[0] * self.process_dims[1];
        if expected != world_size {
            return Err(RuntimeError::ProcessCountMismatch {
                procs: self.process_dims,
                expected,
                actual: world_size,
            });
        }
        for axis in 0..2 {
            let procs = self.process_dims[axis];
            let extent = self.extent[axis];
            if extent <= 0.0 {
                return Err(RuntimeError::topology(format!(
                    "extent on axis {} must be positive",
                    axis
                )));
            }
            if (extent / procs as f64).fract() != 0.0 {
                return Err(RuntimeError::IndivisibleExtent { axis, extent, procs });
            }
            let local = extent / procs as f64;
            if self.buffer < 0.0 || (procs > 1 && self.buffer > local) {
                return Err(RuntimeError::topology(format!(
                    "buffer {} does not fit a local extent of {} on axis {}",
                    self.buffer, local, axis
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_is_valid_for_four_ranks() {
        let config = GridConfig::default();
        assert!(config.validate(4).is_ok());
        assert!(matches!(
            config.validate(3),
            Err(RuntimeError::ProcessCountMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_indivisible_extent() {
        let config = GridConfig {
            extent: [41.0, 60.0],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(4),
            Err(RuntimeError::IndivisibleExtent { axis: 0, procs: 2, .. })
        ));
    }

    #[test]
    fn test_buffer_wider_than_partition() {
        let config = GridConfig {
            buffer: 25.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(4), Err(RuntimeError::Topology(_))));
    }

    #[test]
    fn test_config_from_json() {
        let config: GridConfig = serde_json::from_str(
            r#"{"origin":[0,0],"extent":[10,10],"process_dims":[1,2],"buffer":1,"periodic":true}"#,
        )
        .unwrap();
        assert!(config.periodic);
        assert!(config.validate(2).is_ok());
    }
}
