//! The four batch dispatch strategies a service can select via
//! `modoEnvioLote` in configuration.

use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Every message is an independent worker task; no pacing; returns
    /// immediately.
    Parallel,
    /// A single pacing task submits one message per `delay_ms` tick;
    /// returns immediately.
    ParallelSpaced,
    /// Submits in order, waiting `delay_ms` after each; blocks until the
    /// whole batch is processed.
    SequentialSpaced,
    /// Same order as `SequentialSpaced`, composed as a chain of deferred
    /// steps; returns immediately, completion is logged.
    SequentialSpacedAsync,
}

impl FromStr for DispatchMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "paralelo" => DispatchMode::Parallel,
            "paralelo_espaciado" => DispatchMode::ParallelSpaced,
            "secuencial_espaciado" => DispatchMode::SequentialSpaced,
            "secuencial_espaciado_async" => DispatchMode::SequentialSpacedAsync,
            other => {
                warn!(mode = other, "Unrecognized dispatch mode, falling back to secuencial_espaciado");
                DispatchMode::SequentialSpaced
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_all_four_modes() {
        assert_eq!("paralelo".parse(), Ok(DispatchMode::Parallel));
        assert_eq!("paralelo_espaciado".parse(), Ok(DispatchMode::ParallelSpaced));
        assert_eq!("secuencial_espaciado".parse(), Ok(DispatchMode::SequentialSpaced));
        assert_eq!(
            "secuencial_espaciado_async".parse(),
            Ok(DispatchMode::SequentialSpacedAsync)
        );
    }

    #[test]
    fn unrecognized_mode_falls_back_to_sequential_spaced() {
        assert_eq!("bogus".parse(), Ok(DispatchMode::SequentialSpaced));
    }
}
