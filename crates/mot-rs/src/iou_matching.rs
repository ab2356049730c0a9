use crate::{
    geometry::{footprint_iou, footprint_tlbr},
    Detection, Track,
};
use ndarray::*;

/// Compute intersection over union.
///
/// # Parameters
///
/// * `tlbr`: A footprint extent in format `(min x, min y, max x, max y)`.
/// * `candidates`: A matrix of candidate extents (one per row) in the same format as `tlbr`.
///
/// # Returns
///
/// The intersection over union in [0.0, 1.0] between `tlbr` and each candidate.
pub fn intersection_over_union(tlbr: &Array1<f64>, candidates: &Array2<f64>) -> Array1<f64> {
    let tl = stack![
        Axis(1),
        candidates.column(0).mapv(|v| v.max(tlbr[0])),
        candidates.column(1).mapv(|v| v.max(tlbr[1]))
    ];
    let br = stack![
        Axis(1),
        candidates.column(2).mapv(|v| v.min(tlbr[2])),
        candidates.column(3).mapv(|v| v.min(tlbr[3]))
    ];
    let wh = (br - tl).mapv(|v| v.max(0.0));

    let area_intersection = wh.map_axis(Axis(1), |v| v[0] * v[1]);
    let area_tlbr = (tlbr[2] - tlbr[0]) * (tlbr[3] - tlbr[1]);
    let area_candidates = candidates.map_axis(Axis(1), |v| (v[2] - v[0]) * (v[3] - v[1]));

    let area_union = &area_candidates - &area_intersection + area_tlbr;
    Zip::from(&area_intersection)
        .and(&area_union)
        .map_collect(|intersection, union| {
            if *union > 0.0 {
                (intersection / union).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
}

/// Footprint extents of tracks, one `(min x, min y, max x, max y)` row per track.
pub fn track_footprints(tracks: &[Track]) -> Array2<f64> {
    let mut footprints = Array2::zeros((tracks.len(), 4));
    footprints
        .axis_iter_mut(Axis(0))
        .zip(tracks)
        .for_each(|(mut row, track)| row.assign(&track.footprint_tlbr()));
    footprints
}

/// Footprint overlap between every pair of tracks.
///
/// Extents that intersect are refined with the overlap of the oriented footprints.
///
/// # Returns
///
/// A symmetric matrix of shape tracks.len(), tracks.len() where entry (i, j) is `iou(tracks[i], tracks[j])`.
pub fn track_overlap(tracks: &[Track]) -> Array2<f64> {
    let footprints = track_footprints(tracks);
    let states = tracks.iter().map(Track::state).collect::<Vec<_>>();
    let mut overlap = Array2::zeros((tracks.len(), tracks.len()));
    overlap
        .axis_iter_mut(Axis(0))
        .zip(footprints.outer_iter())
        .for_each(|(mut row, tlbr)| {
            row.assign(&intersection_over_union(&tlbr.to_owned(), &footprints))
        });
    overlap
        .indexed_iter_mut()
        .filter(|(_, iou)| **iou > 0.0)
        .for_each(|((i, j), iou)| {
            *iou = footprint_iou(
                &states[i].pose,
                &states[i].shape,
                &states[j].pose,
                &states[j].shape,
            )
        });
    overlap
}

/// Footprint overlap between a detection and each track.
pub fn detection_overlap(detection: &Detection, tracks: &[Track]) -> Array1<f64> {
    let mut overlap = intersection_over_union(
        &footprint_tlbr(detection.pose(), detection.shape()),
        &track_footprints(tracks),
    );
    overlap
        .iter_mut()
        .zip(tracks)
        .filter(|(iou, _)| **iou > 0.0)
        .for_each(|(iou, track)| {
            let state = track.state();
            *iou = footprint_iou(detection.pose(), detection.shape(), &state.pose, &state.shape)
        });
    overlap
}

#[cfg(test)]
mod tests {
    use crate::motion_model::{self, tests::detection};
    use crate::*;
    use anyhow::Result;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::*;

    #[test]
    fn iou() {
        let iou = iou_matching::intersection_over_union(
            &arr1::<f64>(&[0.0, 0.0, 5.0, 5.0]),
            &arr2::<f64, _>(&[
                [0.0, 0.0, 5.0, 5.0],
                [1.0, 1.0, 6.0, 6.0],
                [2.5, 0.0, 7.5, 5.0],
                [5.0, 5.0, 10.0, 10.0],
            ]),
        );
        assert_approx_eq!(iou[0], 1.0);
        assert_approx_eq!(iou[1], 16.0 / 34.0);
        assert_approx_eq!(iou[2], 12.5 / 37.5);
        assert_approx_eq!(iou[3], 0.0);
    }

    #[test]
    fn iou_without_candidates() {
        let iou = iou_matching::intersection_over_union(
            &arr1::<f64>(&[0.0, 0.0, 5.0, 5.0]),
            &Array2::zeros((0, 4)),
        );
        assert_eq!(iou.len(), 0);
    }

    #[test]
    fn overlap() -> Result<()> {
        let tracks = [(0, 0.0), (1, 1.0), (2, 30.0)]
            .into_iter()
            .map(|(id, x)| {
                let detection = detection(ObjectClass::Car, x, 0.0, 0.0);
                let model =
                    motion_model::create(&detection, &ClassParams::for_class(ObjectClass::Car))?;
                Ok(Track::new(TrackId(id), &detection, model, 0.0))
            })
            .collect::<Result<Vec<_>>>()?;

        let overlap = iou_matching::track_overlap(&tracks);
        assert_eq!(overlap.dim(), (3, 3));
        assert_approx_eq!(overlap[[0, 0]], 1.0);
        // 4.5 x 1.9 footprints shifted by 1.0 along their length
        assert_approx_eq!(overlap[[0, 1]], 3.5 / 5.5);
        assert_approx_eq!(overlap[[1, 0]], overlap[[0, 1]]);
        assert_approx_eq!(overlap[[0, 2]], 0.0);

        let iou =
            iou_matching::detection_overlap(&detection(ObjectClass::Car, 30.0, 0.0, 0.0), &tracks);
        assert_approx_eq!(iou[2], 1.0);
        assert_approx_eq!(iou[0], 0.0);
        Ok(())
    }

    #[test]
    fn rotated_neighbours() -> Result<()> {
        // two lanes of a diagonal road, footprints 2.0 apart across the heading
        let yaw = std::f64::consts::FRAC_PI_4;
        let (dx, dy) = (-2.0 * yaw.sin(), 2.0 * yaw.cos());
        let tracks = [(0, 0.0, 0.0), (1, dx, dy)]
            .into_iter()
            .map(|(id, x, y)| {
                let detection = detection(ObjectClass::Car, x, y, yaw);
                let model =
                    motion_model::create(&detection, &ClassParams::for_class(ObjectClass::Car))?;
                Ok(Track::new(TrackId(id), &detection, model, 0.0))
            })
            .collect::<Result<Vec<_>>>()?;

        let footprints = iou_matching::track_footprints(&tracks);
        let extents =
            iou_matching::intersection_over_union(&footprints.row(0).to_owned(), &footprints);
        assert!(extents[1] > 0.25);

        let overlap = iou_matching::track_overlap(&tracks);
        assert_approx_eq!(overlap[[0, 0]], 1.0);
        assert_approx_eq!(overlap[[0, 1]], 0.0);
        assert_approx_eq!(overlap[[1, 0]], 0.0);

        // half a car length along the heading
        let (ahead_x, ahead_y) = (2.25 * yaw.cos(), 2.25 * yaw.sin());
        let iou = iou_matching::detection_overlap(
            &detection(ObjectClass::Car, ahead_x, ahead_y, yaw),
            &tracks,
        );
        assert_approx_eq!(iou[0], 2.25 / 6.75);
        assert_approx_eq!(iou[1], 0.0);
        Ok(())
    }
}
