//! Gap-filling merge for point-series responses.

use crate::codec::{Codec, PointSeries};
use crate::executor::ServerResponse;
use crate::stats::Stats;

/// One series assembled from every backend's copy. Absent samples are
/// `None`; the metadata comes from the first backend that answered, not
/// from any consensus.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeries {
    pub name: String,
    pub start_time: i64,
    pub step_time: i64,
    pub values: Vec<Option<f64>>,
}

/// Merge point-series responses for one target. Undecodable responses are
/// logged, counted and dropped. Returns `None` when nothing decoded.
///
/// The first decoded response is the base; each of its absent samples is
/// filled from the first later arrival that has the position. A peer whose
/// sample count disagrees with the base aborts the fill on the spot (the
/// disagreement suggests a step or range mismatch that cannot be safely
/// reconciled) and the remaining gaps stay absent.
pub fn merge(responses: &[ServerResponse], codec: &dyn Codec, stats: &Stats) -> Option<MergedSeries> {
    let mut decoded: Vec<PointSeries> = Vec::new();
    for response in responses {
        match codec.decode_render(&response.body) {
            Ok(Some(series)) => decoded.push(series),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    backend = %response.backend,
                    %error,
                    "error decoding render response"
                );
                stats.incr_errors();
            }
        }
    }

    let (base, peers) = decoded.split_first()?;

    let mut values: Vec<Option<f64>> = base
        .values
        .iter()
        .zip(&base.is_absent)
        .map(|(value, absent)| if *absent { None } else { Some(*value) })
        .collect();

    'fill: for i in 0..values.len() {
        if values[i].is_some() {
            continue;
        }
        for peer in peers {
            if peer.values.len() != base.values.len() {
                tracing::warn!(
                    name = %base.name,
                    base = base.values.len(),
                    peer = peer.values.len(),
                    "unable to merge peer with different sample count"
                );
                stats.incr_errors();
                break 'fill;
            }
            if !peer.is_absent[i] {
                values[i] = Some(peer.values[i]);
                break;
            }
        }
    }

    Some(MergedSeries {
        name: base.name.clone(),
        start_time: base.start_time,
        step_time: base.step_time,
        values,
    })
}
