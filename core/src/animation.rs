//! Animation resampling and constant-track elimination.
//!
//! Every surviving track is resampled onto a uniform grid covering the
//! animation's time range, so all tracks of an animation share one input
//! accessor on output. Cubic-spline and step sources collapse to the
//! canonical linear/step forms.

use glam::{Quat, Vec4};

use crate::scene::{Animation, Attr, Interpolation, Node, Track, TrackPath};
use crate::settings::Settings;

const TOLERANCE_LINEAR: f32 = 1e-5;
const TOLERANCE_ROTATION: f32 = 1e-5;
const TOLERANCE_WEIGHTS: f32 = 1e-3;

/// Sample one keyframe value group at time `t`.
fn sample_track(track: &Track, t: f32, out: &mut [Attr]) {
    let times = &track.time;
    let frames = times.len();
    let components = track.components;
    let cubic = track.interpolation == Interpolation::CubicSpline;

    let value = |frame: usize, component: usize| -> Attr {
        let base = frame * components + component;
        if cubic {
            track.data[base * 3 + 1]
        } else {
            track.data[base]
        }
    };

    if t <= times[0] || frames == 1 {
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = value(0, c);
        }
        return;
    }
    if t >= times[frames - 1] {
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = value(frames - 1, c);
        }
        return;
    }

    let mut k = 0;
    while k + 2 < frames && times[k + 1] <= t {
        k += 1;
    }

    let dt = times[k + 1] - times[k];
    let u = if dt == 0.0 { 0.0 } else { (t - times[k]) / dt };

    for (c, slot) in out.iter_mut().enumerate() {
        *slot = match track.interpolation {
            Interpolation::Step => value(k, c),
            Interpolation::Linear => {
                let a = value(k, c);
                let b = value(k + 1, c);
                if track.path == TrackPath::Rotation {
                    nlerp(a, b, u)
                } else {
                    lerp(a, b, u)
                }
            }
            Interpolation::CubicSpline => {
                let base0 = (k * components + c) * 3;
                let base1 = ((k + 1) * components + c) * 3;
                let v = hermite(
                    track.data[base0 + 1],
                    track.data[base0 + 2],
                    track.data[base1 + 1],
                    track.data[base1],
                    u,
                    dt,
                );
                if track.path == TrackPath::Rotation {
                    normalize_quat(v)
                } else {
                    v
                }
            }
        };
    }
}

fn lerp(a: Attr, b: Attr, t: f32) -> Attr {
    (Vec4::from_array(a) + (Vec4::from_array(b) - Vec4::from_array(a)) * t).to_array()
}

fn nlerp(a: Attr, b: Attr, t: f32) -> Attr {
    let qa = Vec4::from_array(a);
    let mut qb = Vec4::from_array(b);
    if qa.dot(qb) < 0.0 {
        qb = -qb;
    }
    let q = qa + (qb - qa) * t;
    normalize_quat(q.to_array())
}

fn normalize_quat(q: Attr) -> Attr {
    Quat::from_array(q).normalize().to_array()
}

/// Hermite interpolation with the glTF cubic-spline tangent convention.
fn hermite(p0: Attr, m0: Attr, p1: Attr, m1: Attr, t: f32, dt: f32) -> Attr {
    let t2 = t * t;
    let t3 = t2 * t;
    let s0 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let s1 = t3 - 2.0 * t2 + t;
    let s2 = -2.0 * t3 + 3.0 * t2;
    let s3 = t3 - t2;

    let p0 = Vec4::from_array(p0);
    let m0 = Vec4::from_array(m0) * dt;
    let p1 = Vec4::from_array(p1);
    let m1 = Vec4::from_array(m1) * dt;

    (p0 * s0 + m0 * s1 + p1 * s2 + m1 * s3).to_array()
}

fn is_constant(path: TrackPath, data: &[Attr], components: usize) -> bool {
    match path {
        TrackPath::Rotation => {
            let first = Vec4::from_array(data[0]);
            data.iter()
                .all(|a| Vec4::from_array(*a).dot(first).abs() >= 1.0 - TOLERANCE_ROTATION)
        }
        TrackPath::Weights => data.chunks(components).all(|frame| {
            frame
                .iter()
                .zip(&data[..components])
                .all(|(a, b)| (a[0] - b[0]).abs() < TOLERANCE_WEIGHTS)
        }),
        _ => {
            let first = data[0];
            data.iter().all(|a| {
                (0..3).all(|k| (a[k] - first[k]).abs() < TOLERANCE_LINEAR)
            })
        }
    }
}

/// Whether a constant track's value matches the node's rest pose.
fn matches_rest_pose(track: &Track, data: &[Attr], node: &Node) -> bool {
    let rest = crate::scene::rest_pose(node);

    match track.path {
        TrackPath::Translation => (0..3).all(|k| {
            (data[0][k] - rest.translation[k]).abs() < TOLERANCE_LINEAR
        }),
        TrackPath::Scale => (0..3).all(|k| (data[0][k] - rest.scale[k]).abs() < TOLERANCE_LINEAR),
        TrackPath::Rotation => {
            let q = Vec4::from_array(data[0]);
            let r = Vec4::from_array(rest.rotation);
            q.dot(r).abs() >= 1.0 - TOLERANCE_ROTATION
        }
        TrackPath::Weights => data[..track.components].iter().enumerate().all(|(k, a)| {
            let rest_weight = node.weights.get(k).copied().unwrap_or(0.0);
            (a[0] - rest_weight).abs() < TOLERANCE_WEIGHTS
        }),
    }
}

/// Resample an animation to the uniform rate and drop redundant tracks.
pub fn process_animation(anim: &mut Animation, nodes: &[Node], settings: &Settings) {
    anim.tracks.retain(|track| {
        if track.time.is_empty() || track.components == 0 {
            log::warn!(
                "ignoring {} track of animation {} because it has no keyframes",
                track.path.name(),
                anim.name.as_deref().unwrap_or("?")
            );
            return false;
        }
        true
    });

    if anim.tracks.is_empty() {
        return;
    }

    let mut min_time = f32::MAX;
    let mut max_time = f32::MIN;
    for track in &anim.tracks {
        min_time = min_time.min(track.time[0]);
        max_time = max_time.max(*track.time.last().unwrap());
    }

    let freq = settings.anim_freq.max(1) as f32;
    let frames = 1 + ((max_time - min_time).max(0.0) * freq).round() as usize;

    for track in &mut anim.tracks {
        let mut data = Vec::with_capacity(frames * track.components);
        let mut frame = vec![[0.0f32; 4]; track.components];
        for i in 0..frames {
            let t = min_time + i as f32 / freq;
            sample_track(track, t, &mut frame);
            data.extend_from_slice(&frame);
        }

        track.constant = is_constant(track.path, &data, track.components);

        if track.constant {
            // A single sample is enough for a constant track.
            track.time = vec![min_time];
            data.truncate(track.components);
            track.interpolation = Interpolation::Step;
        } else {
            track.time = (0..frames).map(|i| min_time + i as f32 / freq).collect();
            if track.interpolation != Interpolation::Step {
                track.interpolation = Interpolation::Linear;
            }
        }

        track.data = data;
    }

    if !settings.anim_const {
        let tracks = std::mem::take(&mut anim.tracks);
        anim.tracks = tracks
            .into_iter()
            .filter(|track| {
                !(track.constant && matches_rest_pose(track, &track.data, &nodes[track.node]))
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeTransform;

    fn translation_track(times: &[f32], values: &[[f32; 3]]) -> Track {
        Track {
            node: 0,
            path: TrackPath::Translation,
            interpolation: Interpolation::Linear,
            components: 1,
            time: times.to_vec(),
            data: values.iter().map(|v| [v[0], v[1], v[2], 0.0]).collect(),
            constant: false,
        }
    }

    fn rotation_track(times: &[f32], values: &[[f32; 4]]) -> Track {
        Track {
            node: 0,
            path: TrackPath::Rotation,
            interpolation: Interpolation::Linear,
            components: 1,
            time: times.to_vec(),
            data: values.to_vec(),
            constant: false,
        }
    }

    fn rest_node() -> Node {
        Node {
            transform: Some(NodeTransform::IDENTITY),
            ..Node::default()
        }
    }

    #[test]
    fn resample_produces_uniform_grid() {
        let mut anim = Animation {
            name: None,
            tracks: vec![translation_track(
                &[0.0, 1.0],
                &[[0.0, 0.0, 0.0], [30.0, 0.0, 0.0]],
            )],
        };

        process_animation(&mut anim, &[rest_node()], &Settings::default());

        let track = &anim.tracks[0];
        assert_eq!(track.time.len(), 31); // 1 + 30 frames over one second
        assert_eq!(track.data.len(), 31);
        // Frame 15 sits halfway.
        assert!((track.data[15][0] - 15.0).abs() < 0.5);
    }

    #[test]
    fn constant_track_matching_rest_pose_removed() {
        let mut anim = Animation {
            name: None,
            tracks: vec![
                translation_track(&[0.0, 1.0], &[[0.0; 3], [0.0; 3]]),
                rotation_track(
                    &[0.0, 1.0],
                    &[[0.0, 0.0, 0.0, 1.0], [0.0, 0.707, 0.0, 0.707]],
                ),
            ],
        };

        process_animation(&mut anim, &[rest_node()], &Settings::default());

        assert_eq!(anim.tracks.len(), 1);
        assert_eq!(anim.tracks[0].path, TrackPath::Rotation);
    }

    #[test]
    fn keep_constant_flag_retains_single_sample_track() {
        let mut anim = Animation {
            name: None,
            tracks: vec![
                translation_track(&[0.0, 1.0], &[[0.0; 3], [0.0; 3]]),
                rotation_track(
                    &[0.0, 1.0],
                    &[[0.0, 0.0, 0.0, 1.0], [0.0, 0.707, 0.0, 0.707]],
                ),
            ],
        };

        let settings = Settings {
            anim_const: true,
            ..Settings::default()
        };
        process_animation(&mut anim, &[rest_node()], &settings);

        assert_eq!(anim.tracks.len(), 2);
        let constant = &anim.tracks[0];
        assert!(constant.constant);
        assert_eq!(constant.time.len(), 1);
        assert_eq!(constant.data.len(), 1);
        assert_eq!(constant.interpolation, Interpolation::Step);
    }

    #[test]
    fn constant_track_off_rest_pose_kept() {
        // Constant at (5, 0, 0) while the rest pose sits at the origin.
        let mut anim = Animation {
            name: None,
            tracks: vec![translation_track(
                &[0.0, 1.0],
                &[[5.0, 0.0, 0.0], [5.0, 0.0, 0.0]],
            )],
        };

        process_animation(&mut anim, &[rest_node()], &Settings::default());
        assert_eq!(anim.tracks.len(), 1);
        assert!(anim.tracks[0].constant);
    }

    #[test]
    fn step_interpolation_is_preserved() {
        let mut track = translation_track(&[0.0, 1.0], &[[0.0; 3], [9.0, 0.0, 0.0]]);
        track.interpolation = Interpolation::Step;

        let mut anim = Animation {
            name: None,
            tracks: vec![track],
        };
        process_animation(&mut anim, &[rest_node()], &Settings::default());

        let track = &anim.tracks[0];
        assert_eq!(track.interpolation, Interpolation::Step);
        // Step holds the left keyframe until the next one.
        assert_eq!(track.data[1][0], 0.0);
        assert_eq!(track.data.last().unwrap()[0], 9.0);
    }

    #[test]
    fn cubic_spline_collapses_to_linear_samples() {
        // One spline segment with zero tangents behaves like smoothstep.
        let mut data = Vec::new();
        for value in [[0.0f32; 3], [6.0, 0.0, 0.0]] {
            data.push([0.0; 4]); // in-tangent
            data.push([value[0], value[1], value[2], 0.0]);
            data.push([0.0; 4]); // out-tangent
        }

        let mut anim = Animation {
            name: None,
            tracks: vec![Track {
                node: 0,
                path: TrackPath::Translation,
                interpolation: Interpolation::CubicSpline,
                components: 1,
                time: vec![0.0, 1.0],
                data,
                constant: false,
            }],
        };

        process_animation(&mut anim, &[rest_node()], &Settings::default());

        let track = &anim.tracks[0];
        assert_eq!(track.interpolation, Interpolation::Linear);
        assert_eq!(track.data.len(), 31);
        assert_eq!(track.data[0][0], 0.0);
        assert!((track.data[30][0] - 6.0).abs() < 1e-5);
        // Midpoint of the hermite curve with zero tangents.
        assert!((track.data[15][0] - 3.0).abs() < 0.2);
    }

    #[test]
    fn rotation_resampling_normalizes() {
        let mut anim = Animation {
            name: None,
            tracks: vec![rotation_track(
                &[0.0, 1.0],
                &[[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 0.0]],
            )],
        };

        process_animation(&mut anim, &[rest_node()], &Settings::default());

        for q in &anim.tracks[0].data {
            let len = Vec4::from_array(*q).length();
            assert!((len - 1.0).abs() < 1e-4);
        }
    }
}
