//! Translates stream configuration and frame-counter state into the
//! `beam_bitstream` packer's parameter structs and CTU-aligned surface
//! dimensions (SPEC_FULL §4.4).

use beam_bitstream::{Colorspace, NalUnitType, PicParams, Range, ReconPic, SeqParams, SliceParams, SliceType};

use crate::core::ring::ring_slots;

/// Minimum HEVC coding block size this encoder targets; surfaces and the
/// encoder context are allocated at multiples of this.
pub const MIN_CB_SIZE: u32 = 16;
pub const CTU_SIZE: u32 = 32;

/// Main profile, main tier, level 4.0 (general_level_idc = 30 * level).
pub const PROFILE_MAIN: u8 = 1;
pub const LEVEL_4_0: u8 = 120;

pub fn align_up(value: u32, to: u32) -> u32 {
    value.div_ceil(to) * to
}

#[derive(Debug, Clone, Copy)]
pub struct SurfaceLayout {
    pub width: u32,
    pub height: u32,
    pub aligned_width: u32,
    pub aligned_height: u32,
}

impl SurfaceLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aligned_width: align_up(width, MIN_CB_SIZE),
            aligned_height: align_up(height, MIN_CB_SIZE),
        }
    }

    pub fn ctus_wide(&self) -> u32 {
        self.aligned_width.div_ceil(CTU_SIZE)
    }

    pub fn ctus_tall(&self) -> u32 {
        self.aligned_height.div_ceil(CTU_SIZE)
    }
}

/// Builds the packer-facing `SeqParams` for the current layout/colorspace.
/// CB/TB hierarchy depths are fixed to match `CTU_SIZE = 32`: min CB 8,
/// max CB 32, min TB 4, max TB 32.
pub fn seq_params(layout: SurfaceLayout, colorspace: Colorspace, range: Range) -> SeqParams {
    SeqParams {
        general_profile_idc: PROFILE_MAIN,
        general_tier_flag: false,
        general_level_idc: LEVEL_4_0,
        pic_width_in_luma_samples: layout.aligned_width,
        pic_height_in_luma_samples: layout.aligned_height,
        source_width: layout.width,
        source_height: layout.height,
        log2_min_luma_coding_block_size_minus3: 0,
        log2_diff_max_min_luma_coding_block_size: 2,
        log2_min_luma_transform_block_size_minus2: 0,
        log2_diff_max_min_luma_transform_block_size: 3,
        max_transform_hierarchy_depth_inter: 2,
        max_transform_hierarchy_depth_intra: 2,
        amp_enabled_flag: true,
        sample_adaptive_offset_enabled_flag: false,
        pcm_enabled_flag: false,
        scaling_list_enabled_flag: false,
        sps_temporal_mvp_enabled_flag: false,
        strong_intra_smoothing_enabled_flag: false,
        colorspace,
        range,
    }
}

/// Builds the `PicParams` for `frame_counter` under an IDR period of
/// `intra_idr_period` frames. `quality_factor` feeds `pic_init_qp_minus26`
/// when the driver falls back to CQP from ICQ.
pub fn pic_params(frame_counter: u64, intra_idr_period: u64, quality_factor: i32) -> PicParams {
    let idr = frame_counter % intra_idr_period == 0;
    let (_current_slot, reference_slot) = ring_slots(frame_counter);
    PicParams {
        decoded_curr_pic: ReconPic { pic_order_cnt: (frame_counter % intra_idr_period) as u32 },
        reference_frame0: if idr {
            None
        } else {
            reference_slot.map(|_| ReconPic { pic_order_cnt: ((frame_counter - 1) % intra_idr_period) as u32 })
        },
        nal_unit_type: if idr { NalUnitType::IdrWRadl } else { NalUnitType::TrailR },
        pic_init_qp_minus26: quality_factor - 26,
        sign_data_hiding_enabled_flag: true,
        constrained_intra_pred_flag: false,
        transform_skip_enabled_flag: false,
        cu_qp_delta_enabled_flag: false,
        diff_cu_qp_delta_depth: 0,
        pps_cb_qp_offset: 0,
        pps_cr_qp_offset: 0,
        weighted_pred_flag: false,
        weighted_bipred_flag: false,
        transquant_bypass_enabled_flag: false,
    }
}

/// Builds the `SliceParams` for a single full-picture slice.
pub fn slice_params(idr: bool) -> SliceParams {
    SliceParams {
        slice_type: if idr { SliceType::I } else { SliceType::P },
        max_num_merge_cand: 4,
        slice_qp_delta: 0,
        num_ref_idx_l0_active_minus1: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_the_minimum_coding_block_size() {
        let layout = SurfaceLayout::new(1920, 1080);
        assert_eq!(layout.aligned_width, 1920);
        assert_eq!(layout.aligned_height, 1088);
    }

    #[test]
    fn odd_dimensions_align_up_to_the_next_multiple_of_sixteen() {
        let layout = SurfaceLayout::new(1281, 721);
        assert_eq!(layout.aligned_width, 1296);
        assert_eq!(layout.aligned_height, 736);
    }

    #[test]
    fn ctu_counts_cover_the_full_aligned_surface() {
        let layout = SurfaceLayout::new(1920, 1080);
        assert_eq!(layout.ctus_wide(), 60);
        assert_eq!(layout.ctus_tall(), 34);
    }

    #[test]
    fn idr_cadence_matches_frame_counter_modulo() {
        let pic = pic_params(6, 6, 28);
        assert!(matches!(pic.nal_unit_type, NalUnitType::IdrWRadl));
        assert!(pic.reference_frame0.is_none());

        let pic = pic_params(7, 6, 28);
        assert!(matches!(pic.nal_unit_type, NalUnitType::TrailR));
        assert!(pic.reference_frame0.is_some());
    }
}
