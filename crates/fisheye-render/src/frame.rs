// frame.rs — per-frame orchestration and the host renderer contract

use std::fs;

use fisheye_common::common::con_printf;
use fisheye_common::mathlib::{angle_vectors, vector_ma, Vec3};
use fisheye_common::pcx::pcx_encode;

use crate::engine::FisheyeEngine;
use crate::globe::{plate_uv_to_ray, ray_to_plate_index, MAX_PLATES};
use crate::lens::{lens_load, LENSPIXEL_NONE};
use crate::palette::NO_TINT;

/// Palette index written over plate pixels outside their voronoi cell in
/// saveglobe screenshots.
const MARGIN_COLOR: u8 = 0xFE;

/// Background for viewport pixels no lens cell maps to.
const CLEAR_COLOR: u8 = 0;

/// Camera parameters for one plate render.
pub struct PlateView {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    /// full horizontal+vertical field of the square view, radians
    pub fov: f64,
}

/// The host renderer. Asked once per displayed plate per frame to draw a
/// perspective view into its linear palette-indexed framebuffer.
pub trait Refresh {
    fn render_view(&mut self, view: &PlateView);
    /// The framebuffer the last render_view drew into, and its row stride.
    /// The view is expected at the viewport origin.
    fn framebuffer(&self) -> (&[u8], usize);
}

/// Output viewport within the video surface.
#[derive(Clone, Copy)]
pub struct VRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// The video surface the composed view is written to.
pub struct VidSurface<'a> {
    pub pixels: &'a mut [u8],
    pub rowbytes: usize,
}

impl FisheyeEngine {
    /// Compose one fisheye frame: rebuild or resume the lens map as needed,
    /// render the displayed plates through the host, and blit the result.
    pub fn render_frame(
        &mut self,
        refresh: &mut dyn Refresh,
        view_angles: &Vec3,
        vid: &mut VidSurface,
        vrect: &VRect,
    ) {
        self.lens.width_px = vrect.width as i32;
        self.lens.height_px = vrect.height as i32;
        let platesize = vrect.width.min(vrect.height);
        self.globe.platesize = platesize;
        let area = vrect.width * vrect.height;
        let sizechange =
            self.prev_width != self.lens.width_px || self.prev_height != self.lens.height_px;

        if sizechange {
            self.globe.pixels = vec![0u8; platesize * platesize * MAX_PLATES];
            self.lens.pixels = vec![LENSPIXEL_NONE; area];
            self.lens.pixel_tints = vec![NO_TINT; area];
        }

        if sizechange || self.fov.changed || self.lens.changed || self.globe.changed {
            self.clear_lensmap();

            // load the lens again, so globals that depend on the globe
            // (e.g. a lens_width computed from numplates) are re-evaluated
            if !self.lens.name.is_empty() {
                let dir = self.lenses_dir();
                let name = self.lens.name.clone();
                self.lens.valid =
                    lens_load(&mut self.script, &dir, &name, self.globe.numplates(), &mut self.lens);
                if !self.lens.valid {
                    self.lens.name.clear();
                    con_printf("not a valid lens\n");
                }
            }
            self.create_lensmap();
        } else if self.builder.working {
            self.resume_lensmap();
        }

        // camera basis for this frame
        let (forward, right, up) = angle_vectors(view_angles);

        for i in 0..self.globe.numplates() {
            if !self.globe.plates[i].display {
                continue;
            }

            // the plate's basis in world space
            let plate = &self.globe.plates[i];
            let view = PlateView {
                forward: compose_axis(&plate.forward, &right, &up, &forward),
                right: compose_axis(&plate.right, &right, &up, &forward),
                up: compose_axis(&plate.up, &right, &up, &forward),
                fov: plate.fov,
            };

            refresh.render_view(&view);
            self.copy_plate(i, refresh, vrect);
        }

        if self.globe.save.pending {
            self.save_globe();
        }

        // background, then the composed view
        vid.pixels.fill(CLEAR_COLOR);
        self.render_lensmap(vid, vrect);

        // store values for change detection
        self.prev_width = self.lens.width_px;
        self.prev_height = self.lens.height_px;

        self.lens.changed = false;
        self.globe.changed = false;
        self.fov.changed = false;
    }

    /// Copy the square plate render out of the host framebuffer into the
    /// plate's slot of the environment map.
    fn copy_plate(&mut self, plate_index: usize, refresh: &dyn Refresh, vrect: &VRect) {
        let platesize = self.globe.platesize;
        let (fb, rowbytes) = refresh.framebuffer();
        let base = plate_index * platesize * platesize;
        for y in 0..platesize {
            let src = (vrect.y + y) * rowbytes + vrect.x;
            let dst = base + y * platesize;
            self.globe.pixels[dst..dst + platesize].copy_from_slice(&fb[src..src + platesize]);
        }
    }

    /// Blit the lens map to the video surface.
    fn render_lensmap(&self, vid: &mut VidSurface, vrect: &VRect) {
        let width = self.lens.width_px as usize;
        let height = self.lens.height_px as usize;

        for y in 0..height {
            for x in 0..width {
                let cell = self.lens.pixels[y * width + x];
                if cell == LENSPIXEL_NONE {
                    continue;
                }
                let color = self.globe.pixels[cell as usize];
                let out = if self.rubix.enabled {
                    let tint = self.lens.pixel_tints[y * width + x];
                    if tint != NO_TINT {
                        self.tint_tables[tint as usize][color as usize]
                    } else {
                        color
                    }
                } else {
                    color
                };
                vid.pixels[(vrect.y + y) * vid.rowbytes + vrect.x + x] = out;
            }
        }
    }

    /// Write each globe plate as a PCX screenshot. Pixels belonging to
    /// another plate's voronoi cell are masked out unless margins were
    /// requested.
    pub(crate) fn save_globe(&mut self) {
        self.globe.save.pending = false;

        let platesize = self.globe.platesize;
        for i in 0..self.globe.numplates() {
            let filename = format!("{}{}.pcx", self.globe.save.name, i);

            let mut data = Vec::with_capacity(platesize * platesize);
            for y in 0..platesize {
                let v = y as f64 / platesize as f64;
                for x in 0..platesize {
                    let u = x as f64 / platesize as f64;
                    let color = self.globe.pixels[self.globe.pixel_index(i, x, y) as usize];
                    let ray = plate_uv_to_ray(&self.globe.plates[i], u, v);
                    let owned = self.globe.save.with_margins
                        || ray_to_plate_index(&self.script, &self.globe.plates, &ray) == i as i32;
                    data.push(if owned { color } else { MARGIN_COLOR });
                }
            }

            let pcx = pcx_encode(&data, platesize, platesize, platesize, &self.base_palette);
            let path = self.gamedir().join(&filename);
            match fs::write(&path, &pcx) {
                Ok(()) => con_printf(&format!("Wrote {}\n", filename)),
                Err(err) => con_printf(&format!("could not write {}: {}\n", filename, err)),
            }
        }
    }
}

/// A globe-local axis expressed in world space: linear combination of the
/// camera basis (right = x, up = y, forward = z).
fn compose_axis(local: &Vec3, right: &Vec3, up: &Vec3, forward: &Vec3) -> Vec3 {
    let mut v = [0.0, 0.0, 0.0];
    v = vector_ma(&v, local[0], right);
    v = vector_ma(&v, local[1], up);
    v = vector_ma(&v, local[2], forward);
    v
}
