//! Sequence reservation against the emission point counters.
//!
//! The counter is only ever advanced by the repository's atomic
//! increment-and-return. The value handed back is the one the store
//! confirmed it wrote, so two callers can never build documents on the same
//! number.

use tracing::debug;

use einvoice_fiscal::{EmissionPoint, EmissionPointKey, NewEmissionPoint, Sequential};
use einvoice_infra::repo::{EmissionPointRepository, RepoError};

use crate::error::{IssuanceError, IssuanceResult};

/// A number taken from a counter. Burned once returned, whatever happens next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub emission_point: EmissionPoint,
    pub sequential: Sequential,
}

/// Fetches or lazily creates the counter for `key` and takes the next number.
pub async fn reserve(
    points: &dyn EmissionPointRepository,
    key: &EmissionPointKey,
) -> IssuanceResult<Reservation> {
    let point = match points.get_by_key(key).await? {
        Some(point) => point,
        None => {
            debug!(
                establishment = %key.establishment,
                point = %key.point,
                document_type = %key.document_type,
                "creating emission point on first use"
            );
            points.create(NewEmissionPoint::fresh(key.clone())).await?
        }
    };

    if !point.is_active {
        return Err(IssuanceError::Configuration(format!(
            "emission point {}-{} for document type {} is inactive",
            point.establishment_code, point.emission_point_code, point.document_type
        )));
    }

    let updated = points.increment_sequence(point.id).await.map_err(|e| match e {
        RepoError::Conflict(msg) => IssuanceError::Configuration(msg),
        other => IssuanceError::Repository(other),
    })?;

    let sequential = updated
        .current()
        .map_err(|e| IssuanceError::Configuration(format!("counter out of range: {e}")))?;

    debug!(
        emission_point_id = %updated.id,
        sequential = %sequential,
        "sequence reserved"
    );

    Ok(Reservation {
        emission_point: updated,
        sequential,
    })
}

/// Creates the counter for `key` continuing a legacy numbering, so the next
/// reservation yields `next_sequence`. An existing counter is left untouched
/// and returned.
pub async fn configure(
    points: &dyn EmissionPointRepository,
    key: EmissionPointKey,
    next_sequence: u64,
) -> IssuanceResult<EmissionPoint> {
    Sequential::new(next_sequence)?;
    if let Some(existing) = points.get_by_key(&key).await? {
        return Ok(existing);
    }
    Ok(points
        .create(NewEmissionPoint::migrated(key, next_sequence))
        .await?)
}
