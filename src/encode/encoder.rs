//! VA-API session wrapping one HEVC `EncSlice` context, the input NV12
//! surface, and the two-slot reconstruction ring (SPEC_FULL §4.4).

use std::rc::Rc;

use cros_libva::{
    BufferType, Config, Context, Display, EncCodedBuffer, EncMiscParameterBuffer, EncMiscParameterType,
    EncPackedHeaderType, EncSequenceParameterBufferHEVC, EncSliceParameterBufferHEVC, Entrypoint, Picture,
    PictureSync, Profile, RTFormat, Surface, SurfaceMemoryDescriptor, UsageHint, VAConfigAttribType,
};

use beam_bitstream::hevc::{write_pps, write_slice_header, write_sps, write_vps};
use beam_bitstream::{BitWriter, Colorspace, Range};

use crate::core::ring::{ring_slots, RING_LEN};
use crate::encode::params::{self, SurfaceLayout};
use crate::error::{ErrorContext, Result, StreamError, VaStatus};
use crate::gpu::{GpuContext, GpuFrame};

const QUALITY_FACTOR: i32 = 28;
const ICQ_RATE_CONTROL: u32 = 0x0000_0200; // VA_RC_ICQ
const CQP_RATE_CONTROL: u32 = 0x0000_0010; // VA_RC_CQP
const PACKED_HEADER_SEQUENCE: u32 = 1 << 2; // VAEncPackedHeaderSequence
const PACKED_HEADER_SLICE: u32 = 1 << 3; // VAEncPackedHeaderSlice

/// Capabilities this encoder probed from the driver at construction, so
/// every later parameter-buffer build consults what's actually supported
/// instead of assuming one driver's behavior.
#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    packed_headers: u32,
    rate_control: u32,
}

impl Capabilities {
    fn supports_packed_sequence_and_slice(self) -> bool {
        self.packed_headers & PACKED_HEADER_SEQUENCE != 0 && self.packed_headers & PACKED_HEADER_SLICE != 0
    }
}

pub struct Encoder {
    display: Rc<Display>,
    context: Rc<Context>,
    input_surface_id: cros_libva::VASurfaceID,
    input_frame: GpuFrame,
    /// Reconstruction surfaces the driver decodes each picture into, in ring
    /// order; `picture_id`s fed to `decoded_curr_pic`/`reference_frames[0]`
    /// (SPEC_FULL §3 "Reconstruction-surface ring").
    ring_surface_ids: [cros_libva::VASurfaceID; RING_LEN],
    layout: SurfaceLayout,
    colorspace: Colorspace,
    range: Range,
    capabilities: Capabilities,
    intra_idr_period: u64,
    frame_counter: u64,
}

impl Encoder {
    /// `width`/`height` are the raw capture dimensions; the reconstruction
    /// ring and encoder context are allocated at the CTU-aligned size derived
    /// from them, while the input surface itself stays at the raw size.
    pub fn new(gpu: &GpuContext, width: u32, height: u32, colorspace: Colorspace, range: Range) -> Result<Self> {
        let layout = SurfaceLayout::new(width, height);
        let display = Display::open().ok_or_else(|| va_error(0, "vaGetDisplay returned null"))?;
        let display = Rc::new(display);

        let profile = Profile::HEVCMain;
        let entrypoint = Entrypoint::EncSlice;

        let capabilities = probe_capabilities(&display, profile, entrypoint)?;

        let rc_mode = if capabilities.rate_control & ICQ_RATE_CONTROL != 0 { ICQ_RATE_CONTROL } else { CQP_RATE_CONTROL };
        let config_attrs = vec![
            (VAConfigAttribType::VAConfigAttribRTFormat, RTFormat::YUV420 as u32),
            (VAConfigAttribType::VAConfigAttribRateControl, rc_mode),
        ];
        let va_config = display
            .create_config(config_attrs, profile, entrypoint)
            .map_err(|e| va_error(e.0, "vaCreateConfig"))?;

        let input_surfaces = display
            .create_surfaces(
                RTFormat::YUV420,
                Some(cros_libva::constants::VA_FOURCC_NV12),
                layout.width,
                layout.height,
                UsageHint::USAGE_HINT_ENCODER,
                1,
            )
            .map_err(|e| va_error(e.0, "vaCreateSurfaces(input)"))?;
        let input_surface = input_surfaces.into_iter().next().ok_or_else(|| va_error(0, "no input surface returned"))?;
        let input_surface_id = input_surface.id();

        // Reconstruction ring: CTU-aligned surfaces the driver writes the
        // decoded picture into, registered with the context alongside the
        // input surface so `decoded_curr_pic`/`reference_frames[0]` can name
        // a real surface every frame.
        let ring_surfaces = display
            .create_surfaces(
                RTFormat::YUV420,
                Some(cros_libva::constants::VA_FOURCC_NV12),
                layout.aligned_width,
                layout.aligned_height,
                UsageHint::USAGE_HINT_ENCODER,
                RING_LEN as u32,
            )
            .map_err(|e| va_error(e.0, "vaCreateSurfaces(ring)"))?;
        if ring_surfaces.len() != RING_LEN {
            return Err(va_error(0, "driver returned fewer reconstruction surfaces than requested"));
        }
        let ring_surface_ids: [cros_libva::VASurfaceID; RING_LEN] = std::array::from_fn(|i| ring_surfaces[i].id());

        let mut context_surfaces: Vec<&Surface<SurfaceMemoryDescriptor>> = vec![&input_surface];
        context_surfaces.extend(ring_surfaces.iter());
        let context = display
            .create_context::<SurfaceMemoryDescriptor>(
                &va_config,
                layout.aligned_width as i32,
                layout.aligned_height as i32,
                Some(context_surfaces.as_slice()),
                true,
            )
            .map_err(|e| va_error(e.0, "vaCreateContext"))?;
        let context = Rc::new(context);

        let export = input_surface
            .export_drm_prime(cros_libva::SurfaceExportFlags::COMPOSED_LAYERS | cros_libva::SurfaceExportFlags::WRITE_ONLY)
            .map_err(|e| va_error(e.0, "vaExportSurfaceHandle"))?;
        let planes = planes_from_export(&export)?;
        let input_frame = gpu.import_frame(planes, layout.width, layout.height, crate::gpu::FOURCC_NV12)?;

        Ok(Self {
            display,
            context,
            input_surface_id,
            input_frame,
            ring_surface_ids,
            layout,
            colorspace,
            range,
            capabilities,
            intra_idr_period: 120, // 2 seconds at 60 Hz
            frame_counter: 0,
        })
    }

    pub fn input_frame(&self) -> &GpuFrame {
        &self.input_frame
    }

    /// Performs one picture encode and returns the resulting coded segment.
    /// The caller wraps it in a wire `Packet` and writes it to the client,
    /// since only the session loop knows the current glass-to-glass latency.
    pub fn encode_frame(&mut self) -> Result<EncodedFrame> {
        let idr = self.frame_counter % self.intra_idr_period == 0;
        let seq = params::seq_params(self.layout, self.colorspace, self.range);
        let pic = params::pic_params(self.frame_counter, self.intra_idr_period, QUALITY_FACTOR);
        let slice = params::slice_params(idr);

        let (current_slot, reference_slot) = ring_slots(self.frame_counter);
        let curr_surface_id = self.ring_surface_ids[current_slot];
        let ref_surface_id = reference_slot.map(|slot| self.ring_surface_ids[slot]);

        let coded_buffer = self
            .display
            .create_enc_coded(3 * self.layout.aligned_width as usize * self.layout.aligned_height as usize / 2)
            .map_err(|e| va_error(e.0, "vaCreateBuffer(coded)"))?;

        let timestamp = self.frame_counter;
        let mut picture = Picture::new(timestamp, Rc::clone(&self.context), self.input_surface_id);

        if idr {
            picture.add_buffer(self.context.create_buffer(BufferType::EncSequenceParameter(
                hevc_seq_buffer(&seq, self.layout),
            )).map_err(|e| va_error(e.0, "vaCreateBuffer(seq)"))?);
            picture.add_buffer(self.context.create_buffer(BufferType::EncMiscParameter(
                rate_control_misc_buffer(QUALITY_FACTOR),
            )).map_err(|e| va_error(e.0, "vaCreateBuffer(rc)"))?);
            picture.add_buffer(self.context.create_buffer(BufferType::EncMiscParameter(
                frame_rate_misc_buffer(60),
            )).map_err(|e| va_error(e.0, "vaCreateBuffer(framerate)"))?);
        }

        picture.add_buffer(
            self.context
                .create_buffer(BufferType::EncPictureParameter(hevc_pic_buffer(
                    &pic,
                    &coded_buffer,
                    curr_surface_id,
                    ref_surface_id,
                )))
                .map_err(|e| va_error(e.0, "vaCreateBuffer(pic)"))?,
        );

        if idr && self.capabilities.supports_packed_sequence_and_slice() {
            let mut header_bytes = Vec::new();
            write_vps(&mut header_bytes, &seq);
            write_sps(&mut header_bytes, &seq);
            write_pps(&mut header_bytes, &pic);
            picture.add_buffer(
                self.context
                    .create_buffer(BufferType::EncPackedHeaderParameter(packed_header_param(
                        EncPackedHeaderType::HEVCSequence,
                        header_bytes.len(),
                    )))
                    .map_err(|e| va_error(e.0, "vaCreateBuffer(packed hdr param)"))?,
            );
            picture.add_buffer(
                self.context
                    .create_buffer(BufferType::EncPackedHeaderData(header_bytes))
                    .map_err(|e| va_error(e.0, "vaCreateBuffer(packed hdr data)"))?,
            );
        }

        if self.capabilities.supports_packed_sequence_and_slice() {
            let mut header_bytes = Vec::new();
            write_slice_header(&mut header_bytes, &seq, &pic, &slice);
            picture.add_buffer(
                self.context
                    .create_buffer(BufferType::EncPackedHeaderParameter(packed_header_param(
                        EncPackedHeaderType::HEVCSlice,
                        header_bytes.len(),
                    )))
                    .map_err(|e| va_error(e.0, "vaCreateBuffer(packed slice param)"))?,
            );
            picture.add_buffer(
                self.context
                    .create_buffer(BufferType::EncPackedHeaderData(header_bytes))
                    .map_err(|e| va_error(e.0, "vaCreateBuffer(packed slice data)"))?,
            );
        }

        picture.add_buffer(
            self.context
                .create_buffer(BufferType::EncSliceParameter(hevc_slice_buffer(&slice, self.layout)))
                .map_err(|e| va_error(e.0, "vaCreateBuffer(slice)"))?,
        );

        let picture = picture.begin().map_err(|e| va_error(e.0, "vaBeginPicture"))?;
        let picture = picture.render().map_err(|e| va_error(e.0, "vaRenderPicture"))?;
        let picture = picture.end().map_err(|e| va_error(e.0, "vaEndPicture"))?;
        let picture: Picture<PictureSync> = picture.sync().map_err(|(e, _)| va_error(e.0, "vaSyncSurface"))?;
        let _ = picture;

        let bytes = read_coded_segment(&coded_buffer)?;

        self.frame_counter += 1;
        Ok(EncodedFrame { bytes, keyframe: idr })
    }
}

/// One coded access unit, ready to be wrapped in a wire `Packet`.
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub keyframe: bool,
}

fn probe_capabilities(display: &Display, profile: Profile, entrypoint: Entrypoint) -> Result<Capabilities> {
    let attrs = display
        .get_config_attributes(
            profile,
            entrypoint,
            &[VAConfigAttribType::VAConfigAttribEncPackedHeaders, VAConfigAttribType::VAConfigAttribRateControl],
        )
        .map_err(|e| va_error(e.0, "vaGetConfigAttributes"))?;
    Ok(Capabilities {
        packed_headers: attrs.first().map(|a| a.value).unwrap_or(0),
        rate_control: attrs.get(1).map(|a| a.value).unwrap_or(CQP_RATE_CONTROL),
    })
}

fn hevc_seq_buffer(seq: &beam_bitstream::SeqParams, layout: SurfaceLayout) -> EncSequenceParameterBufferHEVC {
    EncSequenceParameterBufferHEVC {
        general_profile_idc: seq.general_profile_idc,
        general_level_idc: seq.general_level_idc,
        general_tier_flag: seq.general_tier_flag as u8,
        pic_width_in_luma_samples: layout.aligned_width as u16,
        pic_height_in_luma_samples: layout.aligned_height as u16,
        intra_period: 0, // driver-agnostic: IDR cadence is enforced by this encoder, not the driver
        ..Default::default()
    }
}

/// `VA_PICTURE_HEVC_RPS_ST_CURR_BEFORE`: the reference belongs to the
/// short-term reference picture set, ordered before the current picture.
const RPS_ST_CURR_BEFORE: u32 = 0x0000_0010;

fn hevc_pic_buffer(
    pic: &beam_bitstream::PicParams,
    coded: &EncCodedBuffer,
    curr_surface_id: cros_libva::VASurfaceID,
    ref_surface_id: Option<cros_libva::VASurfaceID>,
) -> cros_libva::EncPictureParameterBufferHEVC {
    let mut reference_frames = [cros_libva::PictureHEVC::invalid(); 15];
    if let (Some(picture_id), Some(reference)) = (ref_surface_id, pic.reference_frame0) {
        reference_frames[0] = cros_libva::PictureHEVC {
            picture_id,
            pic_order_cnt: reference.pic_order_cnt as i32,
            flags: RPS_ST_CURR_BEFORE,
            ..Default::default()
        };
    }

    cros_libva::EncPictureParameterBufferHEVC {
        decoded_curr_pic: cros_libva::PictureHEVC {
            picture_id: curr_surface_id,
            pic_order_cnt: pic.decoded_curr_pic.pic_order_cnt as i32,
            ..Default::default()
        },
        reference_frames,
        coded_buf: coded.id(),
        collocated_ref_pic_index: 0xff,
        last_picture: 0,
        pic_init_qp: (26 + pic.pic_init_qp_minus26) as u8,
        diff_cu_qp_delta_depth: pic.diff_cu_qp_delta_depth as u8,
        pps_cb_qp_offset: pic.pps_cb_qp_offset as i8,
        pps_cr_qp_offset: pic.pps_cr_qp_offset as i8,
        num_tile_columns_minus1: 0,
        num_tile_rows_minus1: 0,
        log2_parallel_merge_level_minus2: 0,
        ctu_max_bitsize_allowed: 0,
        num_ref_idx_l0_default_active_minus1: 0,
        num_ref_idx_l1_default_active_minus1: 0,
        slice_pic_parameter_set_id: 0,
        nal_unit_type: pic.nal_unit_type as u8,
        ..Default::default()
    }
}

fn hevc_slice_buffer(slice: &beam_bitstream::SliceParams, layout: SurfaceLayout) -> EncSliceParameterBufferHEVC {
    EncSliceParameterBufferHEVC {
        slice_segment_address: 0,
        num_ctu_in_slice: layout.ctus_wide() * layout.ctus_tall(),
        slice_type: slice.slice_type as u8,
        slice_qp_delta: slice.slice_qp_delta as i8,
        max_num_merge_cand: slice.max_num_merge_cand,
        num_ref_idx_l0_active_minus1: slice.num_ref_idx_l0_active_minus1,
        ..Default::default()
    }
}

fn rate_control_misc_buffer(quality_factor: i32) -> EncMiscParameterBuffer {
    EncMiscParameterBuffer::new(EncMiscParameterType::RateControl, quality_factor as u32)
}

fn frame_rate_misc_buffer(fps: u32) -> EncMiscParameterBuffer {
    EncMiscParameterBuffer::new(EncMiscParameterType::FrameRate, fps)
}

fn packed_header_param(kind: EncPackedHeaderType, bit_length: usize) -> cros_libva::EncPackedHeaderParameterBuffer {
    cros_libva::EncPackedHeaderParameterBuffer {
        kind,
        bit_length: (bit_length * 8) as u32,
        has_emulation_bytes: 1,
    }
}

fn planes_from_export(export: &cros_libva::VADRMPRIMESurfaceDescriptor) -> Result<crate::core::PlaneSet> {
    use std::os::fd::{FromRawFd, OwnedFd};

    let mut planes = crate::core::PlaneSet::new();
    for layer in export.layers() {
        for plane in layer.planes() {
            let fd = unsafe { OwnedFd::from_raw_fd(libc::dup(plane.fd())) };
            planes.push(crate::core::PlaneDescriptor {
                fd,
                offset: plane.offset(),
                pitch: plane.pitch(),
                modifier: layer.drm_format_modifier(),
            });
        }
    }
    if planes.is_empty() {
        return Err(StreamError::ImportError {
            context: ErrorContext::new("vaExportSurfaceHandle", "no planes exported"),
            supported_fourccs: Vec::new(),
        });
    }
    Ok(planes)
}

/// Single-segment invariant: this encoder never submits multi-slice
/// pictures, so the coded buffer is always exactly one segment.
fn read_coded_segment(coded: &EncCodedBuffer) -> Result<Vec<u8>> {
    let mapping = coded.map().map_err(|e| va_error(e.0, "vaMapBuffer"))?;
    let segment = mapping.segment();
    assert!(segment.next().is_none(), "multi-segment coded buffer: single-slice invariant violated");
    Ok(segment.bytes().to_vec())
}

fn va_error(status: i32, operation: &'static str) -> StreamError {
    StreamError::VaError { status: VaStatus(status), context: ErrorContext::new(operation, "VA-API call failed") }
}
