//! Lifecycle of an electronic receipt.
//!
//! ```text
//! PENDIENTE ──submit──► RECIBIDA ──authorize──► AUTORIZADO*
//!    │  ▲                  │                  ► RECHAZADA*
//!    │  │retry             ▼                  ► EN_PROCESO ─┐
//!    ▼  │               DEVUELTA*                  ▲        │ poll again
//! ERROR_RED / ERROR_ENVIO                          └────────┘
//! ```
//!
//! Terminal states (`*`) never move again. The persisted spelling is the
//! authority's Spanish vocabulary so rows written by older releases stay
//! readable.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use einvoice_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ReceiptStatus {
    Pendiente,
    ErrorRed,
    ErrorEnvio,
    Recibida,
    EnProceso,
    Devuelta,
    Autorizado,
    Rechazada,
}

impl ReceiptStatus {
    pub const ALL: [ReceiptStatus; 8] = [
        ReceiptStatus::Pendiente,
        ReceiptStatus::ErrorRed,
        ReceiptStatus::ErrorEnvio,
        ReceiptStatus::Recibida,
        ReceiptStatus::EnProceso,
        ReceiptStatus::Devuelta,
        ReceiptStatus::Autorizado,
        ReceiptStatus::Rechazada,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pendiente => "PENDIENTE",
            ReceiptStatus::ErrorRed => "ERROR_RED",
            ReceiptStatus::ErrorEnvio => "ERROR_ENVIO",
            ReceiptStatus::Recibida => "RECIBIDA",
            ReceiptStatus::EnProceso => "EN_PROCESO",
            ReceiptStatus::Devuelta => "DEVUELTA",
            ReceiptStatus::Autorizado => "AUTORIZADO",
            ReceiptStatus::Rechazada => "RECHAZADA",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReceiptStatus::Devuelta | ReceiptStatus::Autorizado | ReceiptStatus::Rechazada
        )
    }

    /// Not yet accepted by reception; resume at submission.
    pub fn needs_submission(&self) -> bool {
        matches!(
            self,
            ReceiptStatus::Pendiente | ReceiptStatus::ErrorRed | ReceiptStatus::ErrorEnvio
        )
    }

    /// Accepted by reception; resume at authorization polling.
    pub fn needs_authorization(&self) -> bool {
        matches!(self, ReceiptStatus::Recibida | ReceiptStatus::EnProceso)
    }

    /// The transition table. Self-loops are only allowed where the authority
    /// can legitimately answer the same thing twice.
    pub fn can_transition_to(&self, next: ReceiptStatus) -> bool {
        use ReceiptStatus::*;
        match self {
            Pendiente | ErrorRed | ErrorEnvio => {
                matches!(next, Recibida | Devuelta | ErrorRed | ErrorEnvio)
            }
            Recibida => matches!(next, EnProceso | Autorizado | Rechazada),
            EnProceso => matches!(next, EnProceso | Autorizado | Rechazada),
            Devuelta | Autorizado | Rechazada => false,
        }
    }

    /// Validates `self -> next`.
    pub fn transition(self, next: ReceiptStatus) -> Result<ReceiptStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invariant(format!(
                "illegal receipt transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PENDIENTE" => Ok(ReceiptStatus::Pendiente),
            "ERROR_RED" => Ok(ReceiptStatus::ErrorRed),
            "ERROR_ENVIO" => Ok(ReceiptStatus::ErrorEnvio),
            "RECIBIDA" => Ok(ReceiptStatus::Recibida),
            "EN_PROCESO" | "EN PROCESO" => Ok(ReceiptStatus::EnProceso),
            "DEVUELTA" => Ok(ReceiptStatus::Devuelta),
            "AUTORIZADO" => Ok(ReceiptStatus::Autorizado),
            "RECHAZADA" | "NO AUTORIZADO" => Ok(ReceiptStatus::Rechazada),
            other => Err(DomainError::validation(format!(
                "unknown receipt status: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for ReceiptStatus {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReceiptStatus> for &'static str {
    fn from(value: ReceiptStatus) -> Self {
        value.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReceiptStatus::*;

    #[test]
    fn persisted_names_round_trip() {
        for s in ReceiptStatus::ALL {
            assert_eq!(s.as_str().parse::<ReceiptStatus>().unwrap(), s);
        }
    }

    #[test]
    fn legacy_spellings_are_accepted() {
        assert_eq!("EN PROCESO".parse::<ReceiptStatus>().unwrap(), EnProceso);
        assert_eq!("NO AUTORIZADO".parse::<ReceiptStatus>().unwrap(), Rechazada);
        assert!("AUTHORIZED".parse::<ReceiptStatus>().is_err());
    }

    #[test]
    fn terminal_states_have_no_way_out() {
        for from in [Devuelta, Autorizado, Rechazada] {
            assert!(from.is_terminal());
            for to in ReceiptStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn every_non_terminal_state_can_reach_a_terminal_one() {
        for from in ReceiptStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let mut frontier = vec![from];
            let mut seen = vec![from];
            let mut reached = false;
            while let Some(s) = frontier.pop() {
                for to in ReceiptStatus::ALL {
                    if s.can_transition_to(to) && !seen.contains(&to) {
                        reached |= to.is_terminal();
                        seen.push(to);
                        frontier.push(to);
                    }
                }
            }
            assert!(reached, "{from} is a dead end");
        }
    }

    #[test]
    fn submission_and_authorization_phases_are_disjoint() {
        for s in ReceiptStatus::ALL {
            assert!(!(s.needs_submission() && s.needs_authorization()));
            assert_eq!(
                s.is_terminal(),
                !(s.needs_submission() || s.needs_authorization())
            );
        }
    }

    #[test]
    fn received_documents_cannot_fall_back_to_transport_errors() {
        assert!(Recibida.transition(ErrorRed).is_err());
        assert!(EnProceso.transition(Pendiente).is_err());
        assert_eq!(Pendiente.transition(Recibida).unwrap(), Recibida);
        assert_eq!(ErrorRed.transition(ErrorRed).unwrap(), ErrorRed);
    }
}
