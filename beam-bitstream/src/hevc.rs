// SPDX-License-Identifier: MIT
//! Hand-built HEVC (ITU-T H.265) VPS/SPS/PPS/slice-segment-header packer.
//!
//! The packer is parameterized by small, VA-API-shaped parameter structs
//! (`SeqParams`, `PicParams`, `SliceParams`) rather than by a VA-API crate's
//! own types, so this crate stays free of any hardware dependency and can be
//! exercised with plain synthetic fixtures. The caller (the encoder) is
//! responsible for keeping these structs consistent with the VA-API buffers
//! it actually submits to the driver.
//!
//! Every field not resolvable under the constant choices this packer makes
//! (no B-frames, no tiles, no PCM, no scaling lists, one slice per picture)
//! is asserted rather than silently miscoded.

use crate::writer::{inflate_into, BitWriter};

/// HEVC NAL unit types this packer emits or reasons about (Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NalUnitType {
    TrailR = 1,
    IdrWRadl = 19,
    Vps = 32,
    Sps = 33,
    Pps = 34,
}

impl NalUnitType {
    /// `first_slice_segment_in_pic_flag`-adjacent check: whether this type is
    /// one of the IRAP-range types that carry `no_output_of_prior_pics_flag`.
    fn is_irap(self) -> bool {
        matches!(self as u8, 16..=23)
    }

    fn is_idr(self) -> bool {
        matches!(self, NalUnitType::IdrWRadl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Bt601,
    Bt709,
}

impl Colorspace {
    /// Table E-5 matrix coefficient index.
    fn matrix_coeffs(self) -> u8 {
        match self {
            Colorspace::Bt601 => 6,
            Colorspace::Bt709 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    Narrow,
    Full,
}

impl Range {
    fn full_range_flag(self) -> bool {
        matches!(self, Range::Full)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
}

impl SliceType {
    /// Table 7-7 slice_type code: 2=I, 1=P, 0=B (B unused here).
    fn code(self) -> u64 {
        match self {
            SliceType::I => 2,
            SliceType::P => 1,
        }
    }
}

/// Profile/tier/level fields mirrored from the VA-API sequence parameter
/// buffer. `log2_max_pic_order_cnt_lsb_minus4` is fixed at 8 by this design
/// (SPEC_FULL §4.5), giving a 12-bit POC LSB.
#[derive(Debug, Clone, Copy)]
pub struct SeqParams {
    pub general_profile_idc: u8,
    pub general_tier_flag: bool,
    pub general_level_idc: u8,

    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    /// Source dimensions before CTU alignment; used for the conformance window.
    pub source_width: u32,
    pub source_height: u32,

    pub log2_min_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_luma_coding_block_size: u32,
    pub log2_min_luma_transform_block_size_minus2: u32,
    pub log2_diff_max_min_luma_transform_block_size: u32,
    pub max_transform_hierarchy_depth_inter: u32,
    pub max_transform_hierarchy_depth_intra: u32,

    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm_enabled_flag: bool,
    pub scaling_list_enabled_flag: bool,
    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,

    pub colorspace: Colorspace,
    pub range: Range,
}

impl SeqParams {
    fn conf_win_right_offset_chroma(&self) -> u64 {
        ((self.pic_width_in_luma_samples - self.source_width) / 2) as u64
    }

    fn conf_win_bottom_offset_chroma(&self) -> u64 {
        ((self.pic_height_in_luma_samples - self.source_height) / 2) as u64
    }

    fn needs_conformance_window(&self) -> bool {
        self.pic_width_in_luma_samples != self.source_width
            || self.pic_height_in_luma_samples != self.source_height
    }
}

/// One reconstruction-ring slot reference, as seen by the packer.
#[derive(Debug, Clone, Copy)]
pub struct ReconPic {
    pub pic_order_cnt: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PicParams {
    pub decoded_curr_pic: ReconPic,
    pub reference_frame0: Option<ReconPic>,
    pub nal_unit_type: NalUnitType,

    pub pic_init_qp_minus26: i32,
    pub sign_data_hiding_enabled_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub diff_cu_qp_delta_depth: u32,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SliceParams {
    pub slice_type: SliceType,
    pub max_num_merge_cand: u8,
    pub slice_qp_delta: i32,
    pub num_ref_idx_l0_active_minus1: u8,
}

fn rbsp_trailing_bits(w: &mut BitWriter) {
    w.append_bit(true);
    w.byte_align();
}

fn profile_tier_level(w: &mut BitWriter, seq: &SeqParams) {
    w.append(0, 2); // general_profile_space
    w.append_bit(seq.general_tier_flag);
    w.append(seq.general_profile_idc as u64, 5);

    let compat: u32 = 1 << (31 - seq.general_profile_idc.min(31));
    w.append(compat as u64, 32);

    w.append_bit(true); // general_progressive_source_flag
    w.append_bit(false); // general_interlaced_source_flag
    w.append_bit(true); // general_non_packed_constraint_flag
    w.append_bit(true); // general_frame_only_constraint_flag
    w.append(0, 43); // general_reserved_zero_43bits
    w.append_bit(false); // general_inbld_flag
    w.append(seq.general_level_idc as u64, 8);
}

/// Packs a VPS (NUT 32) RBSP and appends it, start-code-prefixed, to `out`.
pub fn write_vps(out: &mut Vec<u8>, seq: &SeqParams) {
    let mut body = BitWriter::with_capacity(32);
    nal_header(&mut body, NalUnitType::Vps);

    body.append(0, 4); // vps_video_parameter_set_id
    body.append_bit(true); // vps_base_layer_internal_flag
    body.append_bit(true); // vps_base_layer_available_flag
    body.append(0, 6); // vps_max_layers_minus1
    body.append(0, 3); // vps_max_sub_layers_minus1
    body.append_bit(true); // vps_temporal_id_nesting_flag
    body.append(0xffff, 16); // vps_reserved_0xffff_16bits

    profile_tier_level(&mut body, seq);

    body.append_bit(false); // vps_sub_layer_ordering_info_present_flag
    body.append_ue(1); // vps_max_dec_pic_buffering_minus1
    body.append_ue(0); // vps_max_num_reorder_pics
    body.append_ue(0); // vps_max_latency_increase_plus1

    body.append(0, 6); // vps_max_layer_id
    body.append_ue(0); // vps_num_layer_sets_minus1

    body.append_bit(true); // vps_timing_info_present_flag
    body.append(1, 32); // vps_num_units_in_tick
    body.append(60, 32); // vps_time_scale
    body.append_bit(false); // vps_poc_proportional_to_timing_flag
    body.append_ue(0); // vps_num_hrd_parameters

    body.append_bit(false); // vps_extension_flag
    rbsp_trailing_bits(&mut body);

    inflate_into(out, &body.into_bytes());
}

fn vui_parameters(w: &mut BitWriter, seq: &SeqParams) {
    w.append_bit(false); // aspect_ratio_info_present_flag
    w.append_bit(false); // overscan_info_present_flag

    w.append_bit(true); // video_signal_type_present_flag
    w.append(5, 3); // video_format (5 = unspecified)
    w.append_bit(seq.range.full_range_flag());
    w.append_bit(true); // colour_description_present_flag
    w.append(2, 8); // colour_primaries (unspecified)
    w.append(2, 8); // transfer_characteristics (unspecified)
    w.append(seq.colorspace.matrix_coeffs() as u64, 8);

    w.append_bit(false); // chroma_loc_info_present_flag
    w.append_bit(false); // neutral_chroma_indication_flag
    w.append_bit(false); // field_seq_flag
    w.append_bit(false); // frame_field_info_present_flag
    w.append_bit(false); // default_display_window_flag

    w.append_bit(true); // vui_timing_info_present_flag
    w.append(1, 32); // vui_num_units_in_tick
    w.append(60, 32); // vui_time_scale
    w.append_bit(false); // vui_poc_proportional_to_timing_flag
    w.append_bit(false); // vui_hrd_parameters_present_flag

    w.append_bit(true); // bitstream_restriction_flag
    w.append_bit(false); // tiles_fixed_structure_flag
    w.append_bit(true); // motion_vectors_over_pic_boundaries_flag
    w.append_bit(true); // restricted_ref_pic_lists_flag
    w.append_ue(0); // min_spatial_segmentation_idc
    w.append_ue(0); // max_bytes_per_pic_denom
    w.append_ue(0); // max_bits_per_min_cu_denom
    w.append_ue(15); // log2_max_mv_length_horizontal
    w.append_ue(15); // log2_max_mv_length_vertical
}

/// Packs an SPS (NUT 33) RBSP and appends it, start-code-prefixed, to `out`.
pub fn write_sps(out: &mut Vec<u8>, seq: &SeqParams) {
    let mut body = BitWriter::with_capacity(48);
    nal_header(&mut body, NalUnitType::Sps);

    body.append(0, 4); // sps_video_parameter_set_id
    body.append(0, 3); // sps_max_sub_layers_minus1
    body.append_bit(true); // sps_temporal_id_nesting_flag

    profile_tier_level(&mut body, seq);

    body.append_ue(0); // sps_seq_parameter_set_id
    body.append_ue(1); // chroma_format_idc (4:2:0)
    body.append_ue(seq.pic_width_in_luma_samples as u64);
    body.append_ue(seq.pic_height_in_luma_samples as u64);

    let needs_crop = seq.needs_conformance_window();
    body.append_bit(needs_crop);
    if needs_crop {
        body.append_ue(0); // conf_win_left_offset
        body.append_ue(seq.conf_win_right_offset_chroma());
        body.append_ue(0); // conf_win_top_offset
        body.append_ue(seq.conf_win_bottom_offset_chroma());
    }

    body.append_ue(0); // bit_depth_luma_minus8
    body.append_ue(0); // bit_depth_chroma_minus8
    body.append_ue(8); // log2_max_pic_order_cnt_lsb_minus4

    body.append_bit(false); // sps_sub_layer_ordering_info_present_flag
    body.append_ue(1); // sps_max_dec_pic_buffering_minus1
    body.append_ue(0); // sps_max_num_reorder_pics
    body.append_ue(0); // sps_max_latency_increase_plus1

    body.append_ue(seq.log2_min_luma_coding_block_size_minus3 as u64);
    body.append_ue(seq.log2_diff_max_min_luma_coding_block_size as u64);
    body.append_ue(seq.log2_min_luma_transform_block_size_minus2 as u64);
    body.append_ue(seq.log2_diff_max_min_luma_transform_block_size as u64);
    body.append_ue(seq.max_transform_hierarchy_depth_inter as u64);
    body.append_ue(seq.max_transform_hierarchy_depth_intra as u64);

    assert!(
        !seq.scaling_list_enabled_flag,
        "scaling lists are hardcoded away by this packer"
    );
    body.append_bit(false); // scaling_list_enabled_flag

    body.append_bit(seq.amp_enabled_flag);
    body.append_bit(seq.sample_adaptive_offset_enabled_flag);

    assert!(
        !seq.pcm_enabled_flag,
        "PCM is hardcoded away by this packer (see abort conditions)"
    );
    body.append_bit(false); // pcm_enabled_flag

    body.append_ue(0); // num_short_term_ref_pic_sets
    body.append_bit(false); // long_term_ref_pics_present_flag
    body.append_bit(seq.sps_temporal_mvp_enabled_flag);
    body.append_bit(seq.strong_intra_smoothing_enabled_flag);

    body.append_bit(true); // vui_parameters_present_flag
    vui_parameters(&mut body, seq);

    body.append_bit(false); // sps_extension_present_flag
    rbsp_trailing_bits(&mut body);

    inflate_into(out, &body.into_bytes());
}

/// Packs a PPS (NUT 34) RBSP and appends it, start-code-prefixed, to `out`.
pub fn write_pps(out: &mut Vec<u8>, pic: &PicParams) {
    let mut body = BitWriter::with_capacity(16);
    nal_header(&mut body, NalUnitType::Pps);

    body.append_ue(0); // pps_pic_parameter_set_id
    body.append_ue(0); // pps_seq_parameter_set_id
    body.append_bit(false); // dependent_slice_segments_enabled_flag
    body.append_bit(false); // output_flag_present_flag
    body.append(0, 3); // num_extra_slice_header_bits
    body.append_bit(pic.sign_data_hiding_enabled_flag);
    body.append_bit(false); // cabac_init_present_flag
    body.append_ue(0); // num_ref_idx_l0_default_active_minus1
    body.append_ue(0); // num_ref_idx_l1_default_active_minus1
    body.append_se(pic.pic_init_qp_minus26 as i64);
    body.append_bit(pic.constrained_intra_pred_flag);
    body.append_bit(pic.transform_skip_enabled_flag);
    body.append_bit(pic.cu_qp_delta_enabled_flag);
    if pic.cu_qp_delta_enabled_flag {
        body.append_ue(pic.diff_cu_qp_delta_depth as u64);
    }
    body.append_se(pic.pps_cb_qp_offset as i64);
    body.append_se(pic.pps_cr_qp_offset as i64);
    body.append_bit(false); // pps_slice_chroma_qp_offsets_present_flag
    body.append_bit(pic.weighted_pred_flag);
    body.append_bit(pic.weighted_bipred_flag);
    body.append_bit(pic.transquant_bypass_enabled_flag);
    body.append_bit(false); // tiles_enabled_flag
    body.append_bit(false); // entropy_coding_sync_enabled_flag
    body.append_bit(true); // pps_loop_filter_across_slices_enabled_flag
    body.append_bit(false); // deblocking_filter_control_present_flag
    body.append_bit(false); // pps_scaling_list_data_present_flag
    body.append_bit(false); // lists_modification_present_flag
    body.append_ue(0); // log2_parallel_merge_level_minus2
    body.append_bit(false); // slice_segment_header_extension_present_flag
    body.append_bit(false); // pps_extension_present_flag
    rbsp_trailing_bits(&mut body);

    inflate_into(out, &body.into_bytes());
}

/// Packs a slice segment header NAL (type taken from `pic.nal_unit_type`)
/// and appends it, start-code-prefixed, to `out`. The slice data (CTU
/// payload) is produced by the VA-API driver and is not packed here — the
/// caller appends it immediately after, inside the same escaped NAL, which
/// is why this function leaves the writer byte-aligned but does not close
/// the NAL with a new start code.
pub fn write_slice_header(out: &mut Vec<u8>, seq: &SeqParams, pic: &PicParams, slice: &SliceParams) {
    let nut = pic.nal_unit_type;
    let mut body = BitWriter::with_capacity(16);
    nal_header(&mut body, nut);

    body.append_bit(true); // first_slice_segment_in_pic_flag
    if nut.is_irap() {
        body.append_bit(false); // no_output_of_prior_pics_flag
    }
    body.append_ue(0); // slice_pic_parameter_set_id

    body.append_ue(slice.slice_type.code());

    if !nut.is_idr() {
        let poc_lsb_bits = 8 + 4; // log2_max_pic_order_cnt_lsb_minus4 == 8
        let poc_lsb_mask = (1u64 << poc_lsb_bits) - 1;
        body.append(pic.decoded_curr_pic.pic_order_cnt as u64 & poc_lsb_mask, poc_lsb_bits as u32);

        body.append_bit(false); // short_term_ref_pic_set_sps_flag
        let has_ref = pic.reference_frame0.is_some();
        body.append_ue(if has_ref { 1 } else { 0 }); // num_negative_pics
        body.append_ue(0); // num_positive_pics
        if has_ref {
            body.append_ue(0); // delta_poc_s0_minus1[0]
            body.append_bit(true); // used_by_curr_pic_s0_flag[0]
        }

        if seq.sps_temporal_mvp_enabled_flag {
            body.append_bit(false); // slice_temporal_mvp_enabled_flag
        }
    }

    if seq.sample_adaptive_offset_enabled_flag {
        body.append_bit(false); // slice_sao_luma_flag
        body.append_bit(false); // slice_sao_chroma_flag
    }

    if matches!(slice.slice_type, SliceType::P) {
        body.append_bit(true); // num_ref_idx_active_override_flag
        body.append_ue(slice.num_ref_idx_l0_active_minus1 as u64);
        assert!(
            !pic.weighted_pred_flag,
            "weighted prediction is hardcoded away by this packer"
        );
        assert_eq!(slice.max_num_merge_cand.clamp(0, 5), slice.max_num_merge_cand);
        body.append_ue((5 - slice.max_num_merge_cand) as u64); // five_minus_max_num_merge_cand
    }

    body.append_se(slice.slice_qp_delta as i64);

    // pps_loop_filter_across_slices_enabled_flag is hardcoded true, so this
    // field is always present.
    body.append_bit(true); // slice_loop_filter_across_slices_enabled_flag

    // byte_alignment(): one `1` bit then zero-padding, same shape as
    // rbsp_trailing_bits but named distinctly by the standard.
    body.append_bit(true);
    body.byte_align();

    inflate_into(out, &body.into_bytes());
}

fn nal_header(w: &mut BitWriter, nut: NalUnitType) {
    w.append_bit(false); // forbidden_zero_bit
    w.append(nut as u64, 6);
    w.append(0, 6); // nuh_layer_id
    w.append(1, 3); // nuh_temporal_id_plus1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_seq() -> SeqParams {
        SeqParams {
            general_profile_idc: 1,
            general_tier_flag: false,
            general_level_idc: 120, // level 4
            pic_width_in_luma_samples: 1920,
            pic_height_in_luma_samples: 1080,
            source_width: 1920,
            source_height: 1080,
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
            colorspace: Colorspace::Bt709,
            range: Range::Narrow,
        }
    }

    fn fixture_pic(idr: bool) -> PicParams {
        PicParams {
            decoded_curr_pic: ReconPic { pic_order_cnt: if idr { 0 } else { 1 } },
            reference_frame0: if idr { None } else { Some(ReconPic { pic_order_cnt: 0 }) },
            nal_unit_type: if idr { NalUnitType::IdrWRadl } else { NalUnitType::TrailR },
            pic_init_qp_minus26: 2,
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

    fn fixture_slice(idr: bool) -> SliceParams {
        SliceParams {
            slice_type: if idr { SliceType::I } else { SliceType::P },
            max_num_merge_cand: 4,
            slice_qp_delta: 0,
            num_ref_idx_l0_active_minus1: 0,
        }
    }

    #[test]
    fn nal_header_first_bytes_match_expected_nal_unit_types() {
        let seq = fixture_seq();
        let mut out = Vec::new();
        write_vps(&mut out, &seq);
        assert_eq!(&out[0..5], &[0x00, 0x00, 0x00, 0x01, 0x40]);

        let mut out = Vec::new();
        write_sps(&mut out, &seq);
        assert_eq!(&out[0..5], &[0x00, 0x00, 0x00, 0x01, 0x42]);

        let mut out = Vec::new();
        write_pps(&mut out, &fixture_pic(true));
        assert_eq!(&out[0..5], &[0x00, 0x00, 0x00, 0x01, 0x44]);

        let mut out = Vec::new();
        write_slice_header(&mut out, &seq, &fixture_pic(true), &fixture_slice(true));
        assert_eq!(&out[0..5], &[0x00, 0x00, 0x00, 0x01, 0x26]);
    }

    #[test]
    fn idr_slice_header_omits_poc_and_ref_set() {
        let seq = fixture_seq();
        let pic = fixture_pic(true);
        let slice = fixture_slice(true);
        let mut out = Vec::new();
        write_slice_header(&mut out, &seq, &pic, &slice);
        // Just verify it doesn't panic and produces a byte-aligned, start-coded NAL.
        assert_eq!(&out[0..4], &crate::writer::START_CODE);
        assert_eq!((out.len() - 4) % 1, 0);
    }

    #[test]
    fn non_idr_slice_header_references_previous_poc() {
        let seq = fixture_seq();
        let pic = fixture_pic(false);
        let slice = fixture_slice(false);
        let mut out = Vec::new();
        write_slice_header(&mut out, &seq, &pic, &slice);
        assert_eq!(&out[0..5], &[0x00, 0x00, 0x00, 0x01, 0x02]); // TRAIL_R=1 -> 1<<1=2
    }

    #[test]
    fn conformance_window_present_iff_aligned_dims_differ() {
        let mut seq = fixture_seq();
        seq.pic_width_in_luma_samples = 1920;
        seq.pic_height_in_luma_samples = 1080;
        seq.source_width = 1918;
        seq.source_height = 1078;
        assert!(seq.needs_conformance_window());
        assert_eq!(seq.conf_win_right_offset_chroma(), 1);
        assert_eq!(seq.conf_win_bottom_offset_chroma(), 1);

        seq.source_width = 1920;
        seq.source_height = 1080;
        assert!(!seq.needs_conformance_window());
    }

    #[test]
    #[should_panic]
    fn pcm_enabled_is_rejected() {
        let mut seq = fixture_seq();
        seq.pcm_enabled_flag = true;
        write_sps(&mut Vec::new(), &seq);
    }
}
