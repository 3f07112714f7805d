// lensmap.rs — the lens map builder
//
// Computing the map is slow (one script call per pixel or per plate texel),
// so the work is limited to a wall-clock slice per frame. The builder keeps
// its cursor between frames and resumes where it left off, which lets the
// user watch the pixels appear as they are calculated.

use std::time::Instant;

use fisheye_common::common::con_printf;
use fisheye_common::mathlib::Vec3;

use crate::engine::FisheyeEngine;
use crate::globe::{plate_uv_to_ray, ray_to_plate_index, ray_to_plate_uv};
use crate::lens::{determine_lens_scale, MapType, LENSPIXEL_NONE};
use crate::palette::NO_TINT;
use crate::script::Projected;

/// Quads wider or taller than this are assumed to straddle a lens
/// discontinuity (e.g. the 180-degree seam) and are dropped.
const MAX_QUAD_SPAN: i32 = 20;

pub struct InverseState {
    /// current output row, counting down
    pub ly: i32,
}

pub struct ForwardState {
    /// screen coordinates of the cell boundaries above and below the
    /// current plate row, platesize+1 points each
    pub top: Vec<[i32; 2]>,
    pub bot: Vec<[i32; 2]>,
    pub plate_index: usize,
    /// current plate row, counting down
    pub py: i32,
}

pub struct LensBuilder {
    pub working: bool,
    start_time: Instant,
    pub seconds_per_frame: f64,
    pub inverse: InverseState,
    pub forward: ForwardState,
}

impl LensBuilder {
    pub fn new() -> Self {
        Self {
            working: false,
            start_time: Instant::now(),
            seconds_per_frame: 1.0 / 60.0,
            inverse: InverseState { ly: -1 },
            forward: ForwardState {
                top: Vec::new(),
                bot: Vec::new(),
                plate_index: 0,
                py: -1,
            },
        }
    }

    fn start_clock(&mut self) {
        self.start_time = Instant::now();
    }

    fn time_up(&self) -> bool {
        self.start_time.elapsed().as_secs_f64() >= self.seconds_per_frame
    }
}

impl Default for LensBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FisheyeEngine {
    /// Mark the grid tint for a lens pixel, unless the plate pixel falls on
    /// a rubix grid line.
    fn set_lensmap_grid(&mut self, lx: i32, ly: i32, px: i32, py: i32, plate_index: usize) {
        let block_size = self.rubix.pad_size + self.rubix.cell_size;
        let num_units = self.rubix.numcells as f64 * block_size + self.rubix.pad_size;
        let unit_size_px = self.globe.platesize as f64 / num_units;

        // plate pixel position in grid units
        let ux = px as f64 / unit_size_px;
        let uy = py as f64 / unit_size_px;

        let ongrid =
            ux % block_size < self.rubix.pad_size || uy % block_size < self.rubix.pad_size;

        if !ongrid {
            let at = (ly * self.lens.width_px + lx) as usize;
            self.lens.pixel_tints[at] = plate_index as u8;
        }
    }

    /// Map a lens pixel to a plate pixel.
    fn set_lensmap_from_plate(&mut self, lx: i32, ly: i32, px: i32, py: i32, plate_index: usize) {
        if lx < 0 || lx >= self.lens.width_px || ly < 0 || ly >= self.lens.height_px {
            return;
        }
        let platesize = self.globe.platesize as i32;
        if px < 0 || px >= platesize || py < 0 || py >= platesize {
            return;
        }

        // this plate now has to be rendered each frame
        self.globe.plates[plate_index].display = true;

        let cell = self.globe.pixel_index(plate_index, px as usize, py as usize);
        let at = (ly * self.lens.width_px + lx) as usize;
        self.lens.pixels[at] = cell;

        self.set_lensmap_grid(lx, ly, px, py, plate_index);
    }

    fn set_lensmap_from_plate_uv(&mut self, lx: i32, ly: i32, u: f64, v: f64, plate_index: usize) {
        let px = (u * self.globe.platesize as f64) as i32;
        let py = (v * self.globe.platesize as f64) as i32;
        self.set_lensmap_from_plate(lx, ly, px, py, plate_index);
    }

    /// Map a lens pixel to the plate pixel hit by a view ray.
    fn set_lensmap_from_ray(&mut self, lx: i32, ly: i32, ray: &Vec3) {
        let plate_index = ray_to_plate_index(&self.script, &self.globe.plates, ray);
        if plate_index < 0 {
            return;
        }

        let (u, v, inside) = ray_to_plate_uv(&self.globe.plates[plate_index as usize], ray);
        if !inside {
            return;
        }

        self.set_lensmap_from_plate_uv(lx, ly, u, v, plate_index as usize);
    }

    fn resume_lensmap_inverse(&mut self) -> bool {
        self.builder.start_clock();
        while self.builder.inverse.ly >= 0 {
            // pause when the time allowed per frame is used up
            if self.builder.time_up() {
                return true;
            }

            let ly = self.builder.inverse.ly;
            let y = -((ly - self.lens.height_px / 2) as f64) * self.lens.scale;

            for lx in 0..self.lens.width_px {
                let x = ((lx - self.lens.width_px / 2) as f64) * self.lens.scale;

                // follow the light ray through this pixel
                match self.script.call_inverse(x, y) {
                    Projected::Value(ray) => self.set_lensmap_from_ray(lx, ly, &ray),
                    Projected::Skip => {}
                    Projected::Fail => {
                        self.lens.valid = false;
                        return false;
                    }
                }
            }

            self.builder.inverse.ly -= 1;
        }

        // done building
        false
    }

    /// Map a plate uv coordinate to a screen coordinate through the forward
    /// projection.
    fn uv_to_screen(&self, plate_index: usize, u: f64, v: f64) -> Projected<[i32; 2]> {
        let ray = plate_uv_to_ray(&self.globe.plates[plate_index], u, v);
        match self.script.call_forward(&ray) {
            Projected::Value((x, y)) => {
                let lx = (x / self.lens.scale + (self.lens.width_px / 2) as f64) as i32;
                let ly = (-y / self.lens.scale + (self.lens.height_px / 2) as f64) as i32;
                Projected::Value([lx, ly])
            }
            Projected::Skip => Projected::Skip,
            Projected::Fail => Projected::Fail,
        }
    }

    /// Compute one boundary scanline of the current plate row. Returns false
    /// when the scripted map aborts the build. Skipped points keep whatever
    /// coordinate was already in the buffer.
    fn fill_boundary_row(&mut self, plate_index: usize, v: f64, into_top: bool) -> bool {
        let platesize = self.globe.platesize as i32;
        for px in 0..platesize {
            if px == 0 {
                let u = -0.5 / platesize as f64;
                match self.uv_to_screen(plate_index, u, v) {
                    Projected::Value(pt) => {
                        if into_top {
                            self.builder.forward.top[0] = pt;
                        } else {
                            self.builder.forward.bot[0] = pt;
                        }
                    }
                    Projected::Skip => continue,
                    Projected::Fail => return false,
                }
            }
            let u = (px as f64 + 0.5) / platesize as f64;
            match self.uv_to_screen(plate_index, u, v) {
                Projected::Value(pt) => {
                    let at = px as usize + 1;
                    if into_top {
                        self.builder.forward.top[at] = pt;
                    } else {
                        self.builder.forward.bot[at] = pt;
                    }
                }
                Projected::Skip => continue,
                Projected::Fail => return false,
            }
        }
        true
    }

    /// Fill a quadrilateral on the lens map with one plate pixel. The corner
    /// points are taken in clockwise order.
    fn draw_quad(
        &mut self,
        tl: [i32; 2],
        tr: [i32; 2],
        bl: [i32; 2],
        br: [i32; 2],
        plate_index: usize,
        px: i32,
        py: i32,
    ) {
        let p = [tl, tr, br, bl];

        let mut minx = tl[0];
        let mut maxx = tl[0];
        let mut miny = tl[1];
        let mut maxy = tl[1];
        for q in &p[1..] {
            if q[0] < minx {
                minx = q[0];
            } else if q[0] > maxx {
                maxx = q[0];
            }
            if q[1] < miny {
                miny = q[1];
            } else if q[1] > maxy {
                maxy = q[1];
            }
        }

        // a quad spanning this much of the image is assumed to be wrapping
        // around a lens discontinuity rather than covering real area.
        // wide i64 math: the corners saturate toward i32 extremes when the
        // forward map blows up near a pole
        if (maxx as i64 - minx as i64) > MAX_QUAD_SPAN as i64
            || (maxy as i64 - miny as i64) > MAX_QUAD_SPAN as i64
        {
            return;
        }

        // single pixel
        if miny == maxy && minx == maxx {
            self.set_lensmap_from_plate(tl[0], tl[1], px, py, plate_index);
            return;
        }

        // horizontal line
        if miny == maxy {
            for tx in minx..=maxx {
                self.set_lensmap_from_plate(tx, miny, px, py, plate_index);
            }
            return;
        }

        // vertical line
        if minx == maxx {
            for ty in miny..=maxy {
                self.set_lensmap_from_plate(tl[0], ty, px, py, plate_index);
            }
            return;
        }

        for y in miny..=maxy {
            // intersect each edge with this scanline; a clockwise polygon
            // yields exactly two crossings
            let mut tx = [minx, maxx];
            let mut txi = 0;
            let mut j = 3;
            for i in 0..4 {
                let (ix, iy) = (p[i][0], p[i][1]);
                let (jx, jy) = (p[j][0], p[j][1]);
                if (iy < y && y <= jy) || (jy < y && y <= iy) {
                    let dy = (jy - iy) as f64;
                    let dx = (jx - ix) as f64;
                    tx[txi] = (ix as f64 + (y - iy) as f64 / dy * dx) as i32;
                    txi += 1;
                    if txi == 2 {
                        break;
                    }
                }
                j = i;
            }

            if tx[0] > tx[1] {
                tx.swap(0, 1);
            }

            if tx[1] as i64 - tx[0] as i64 > MAX_QUAD_SPAN as i64 {
                con_printf(&format!("{} > max quad span\n", tx[1] as i64 - tx[0] as i64));
                return;
            }

            for x in tx[0]..=tx[1] {
                self.set_lensmap_from_plate(x, y, px, py, plate_index);
            }
        }
    }

    fn resume_lensmap_forward(&mut self) -> bool {
        let platesize = self.globe.platesize as i32;

        self.builder.start_clock();
        while self.builder.forward.plate_index < self.globe.numplates() {
            while self.builder.forward.py >= 0 {
                // pause when the time allowed per frame is used up
                if self.builder.time_up() {
                    return true;
                }

                let plate_index = self.builder.forward.plate_index;
                let py = self.builder.forward.py;

                // screen coordinates of the boundaries below and above this
                // texture row
                if py == platesize - 1 {
                    let v = (py as f64 + 0.5) / platesize as f64;
                    if !self.fill_boundary_row(plate_index, v, false) {
                        self.lens.valid = false;
                        return false;
                    }
                } else {
                    // the previous row's top boundary is this row's bottom
                    std::mem::swap(&mut self.builder.forward.top, &mut self.builder.forward.bot);
                }

                let v = (py as f64 - 0.5) / platesize as f64;
                if !self.fill_boundary_row(plate_index, v, true) {
                    self.lens.valid = false;
                    return false;
                }

                // a quad per texel in this row
                let v = py as f64 / platesize as f64;
                for px in 0..platesize {
                    // skip texels owned by another plate, so overlapping
                    // regions are drawn exactly once
                    let u = px as f64 / platesize as f64;
                    let ray = plate_uv_to_ray(&self.globe.plates[plate_index], u, v);
                    if ray_to_plate_index(&self.script, &self.globe.plates, &ray)
                        != plate_index as i32
                    {
                        continue;
                    }

                    let at = px as usize;
                    let tl = self.builder.forward.top[at];
                    let tr = self.builder.forward.top[at + 1];
                    let bl = self.builder.forward.bot[at];
                    let br = self.builder.forward.bot[at + 1];
                    self.draw_quad(tl, tr, bl, br, plate_index, px, py);
                }

                self.builder.forward.py -= 1;
            }

            // next plate starts at its bottom row again
            self.builder.forward.py = platesize - 1;
            self.builder.forward.plate_index += 1;
        }

        // done building
        false
    }

    /// Continue building the lens map from the saved cursor.
    pub fn resume_lensmap(&mut self) {
        self.builder.working = match self.lens.map_type {
            MapType::Forward => self.resume_lensmap_forward(),
            MapType::Inverse => self.resume_lensmap_inverse(),
            MapType::None => false,
        };
    }

    /// Start a fresh lens map build.
    pub fn create_lensmap(&mut self) {
        self.builder.working = false;

        // render nothing while the lens or globe is broken
        if !self.lens.valid || !self.globe.valid {
            return;
        }

        // check that this lens supports the current fov
        if !determine_lens_scale(&self.script, &self.fov, &mut self.lens) {
            return;
        }

        for plate in &mut self.globe.plates {
            plate.display = false;
        }

        match self.lens.map_type {
            MapType::Forward => {
                con_printf("using forward map\n");
                let points = self.globe.platesize + 1;
                self.builder.forward.top = vec![[0, 0]; points];
                self.builder.forward.bot = vec![[0, 0]; points];
                self.builder.forward.plate_index = 0;
                self.builder.forward.py = self.globe.platesize as i32 - 1;
                self.resume_lensmap();
            }
            MapType::Inverse => {
                con_printf("using inverse map\n");
                self.builder.inverse.ly = self.lens.height_px - 1;
                self.resume_lensmap();
            }
            MapType::None => {
                con_printf("no inverse or forward map being used\n");
            }
        }
    }

    /// Reset the lens map to all-null cells.
    pub(crate) fn clear_lensmap(&mut self) {
        self.lens.pixels.fill(LENSPIXEL_NONE);
        self.lens.pixel_tints.fill(NO_TINT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VRect;
    use crate::testutil::{run_frame, run_until_built, setup_engine, write_lens, StubRefresh};

    const RECT_LENS: &str = "\
max_hfov = 179
max_vfov = 179

function lens_inverse(x, y)
   return x, y, 1
end

function lens_forward(x, y, z)
   if z <= 0 then
      return nil
   end
   return x / z, y / z
end
";

    const FORWARD_ONLY_LENS: &str = "\
max_hfov = 360
max_vfov = 180

function lens_forward(x, y, z)
   local lat, lon = ray_to_latlon(x, y, z)
   return lon, lat
end
";

    // equidistant fisheye capped at a 180 degree circle; everything
    // outside the circle is skipped
    const CAPPED_FISHEYE_LENS: &str = "\
max_hfov = 360
max_vfov = 360

function lens_inverse(x, y)
   local r = sqrt(x * x + y * y)
   if r > pi / 2 then
      return nil
   end
   if r == 0 then
      return 0, 0, 1
   end
   local s = sin(r) / r
   return x * s, y * s, cos(r)
end

function lens_forward(x, y, z)
   local r = acos(z)
   local d = sqrt(x * x + y * y)
   if d == 0 then
      return 0, 0
   end
   return x * r / d, y * r / d
end
";

    #[test]
    fn test_inverse_build_identity_mapping() {
        // a 90 degree rectilinear view of the front plate on a square
        // viewport degenerates to the identity: lens pixel = plate pixel
        let mut engine = setup_engine("identity");
        write_lens(&engine, "rect", RECT_LENS);
        engine.execute_string("globe cube");
        engine.execute_string("lens rect");
        engine.execute_string("hfov 90");

        let vrect = VRect { x: 0, y: 0, width: 51, height: 51 };
        let mut stub = StubRefresh::new(51, 51);
        let mut vid = vec![0u8; 51 * 51];
        run_until_built(&mut engine, &mut stub, &mut vid, 51, &vrect);

        assert!(engine.lens.valid);
        for ly in 0..51usize {
            for lx in 0..51usize {
                let cell = engine.lens.pixels[ly * 51 + lx];
                assert_eq!(cell, engine.globe.pixel_index(0, lx, ly));
            }
        }
        // only the front plate is in use
        assert!(engine.globe.plates[0].display);
        for plate in &engine.globe.plates[1..] {
            assert!(!plate.display);
        }
    }

    #[test]
    fn test_rubix_grid_tint_counts() {
        // 51 pixels across a 10-cell grid with cell 4 and pad 1 makes each
        // grid unit exactly one plate pixel, so the tinted pixels are the
        // 40x40 cell interior positions
        let mut engine = setup_engine("rubixcount");
        write_lens(&engine, "rect", RECT_LENS);
        engine.execute_string("globe cube");
        engine.execute_string("lens rect");
        engine.execute_string("hfov 90");
        engine.execute_string("rubixgrid 10 4 1");

        let vrect = VRect { x: 0, y: 0, width: 51, height: 51 };
        let mut stub = StubRefresh::new(51, 51);
        let mut vid = vec![0u8; 51 * 51];
        run_until_built(&mut engine, &mut stub, &mut vid, 51, &vrect);

        let tinted = engine
            .lens
            .pixel_tints
            .iter()
            .filter(|&&t| t != NO_TINT)
            .count();
        assert_eq!(tinted, 40 * 40);
    }

    #[test]
    fn test_display_matches_mapped_plates() {
        let mut engine = setup_engine("display");
        engine.execute_string("globe cube");
        engine.execute_string("lens equirect");
        engine.execute_string("hfov 90");

        let vrect = VRect { x: 0, y: 0, width: 16, height: 16 };
        let mut stub = StubRefresh::new(16, 16);
        let mut vid = vec![0u8; 16 * 16];
        run_until_built(&mut engine, &mut stub, &mut vid, 16, &vrect);

        let platearea = (engine.globe.platesize * engine.globe.platesize) as u32;
        let mut mapped = [false; 6];
        for &cell in &engine.lens.pixels {
            if cell != LENSPIXEL_NONE {
                mapped[(cell / platearea) as usize] = true;
            }
        }
        for (plate, &was_mapped) in engine.globe.plates.iter().zip(&mapped) {
            assert_eq!(plate.display, was_mapped);
        }
        // a 90x90 equirect view touches the front plate and, in the
        // corners, the top and bottom plates
        assert_eq!(mapped, [true, false, false, false, true, true]);
    }

    #[test]
    fn test_skip_leaves_pixels_null() {
        let mut engine = setup_engine("skip");
        write_lens(&engine, "capped", CAPPED_FISHEYE_LENS);
        engine.execute_string("globe cube");
        engine.execute_string("lens capped");
        engine.execute_string("hfov 180");

        let vrect = VRect { x: 0, y: 0, width: 16, height: 16 };
        let mut stub = StubRefresh::new(16, 16);
        let mut vid = vec![0u8; 16 * 16];
        run_until_built(&mut engine, &mut stub, &mut vid, 16, &vrect);

        assert!(engine.lens.valid);
        // the image circle fits the width, so the corners fall outside it
        assert_eq!(engine.lens.pixels[0], LENSPIXEL_NONE);
        assert_eq!(engine.lens.pixels[15], LENSPIXEL_NONE);
        assert_ne!(engine.lens.pixels[8 * 16 + 8], LENSPIXEL_NONE);
    }

    #[test]
    fn test_bad_return_aborts_build() {
        let mut engine = setup_engine("abort");
        write_lens(
            &engine,
            "broken",
            "max_hfov = 360
max_vfov = 180
function lens_inverse(x, y)
   return \"boo\"
end
function lens_forward(x, y, z)
   local lat, lon = ray_to_latlon(x, y, z)
   return lon, lat
end
",
        );
        engine.execute_string("globe cube");
        engine.execute_string("lens broken");
        engine.execute_string("hfov 90");

        let vrect = VRect { x: 0, y: 0, width: 16, height: 16 };
        let mut stub = StubRefresh::new(16, 16);
        let mut vid = vec![0u8; 16 * 16];
        run_frame(&mut engine, &mut stub, &mut vid, 16, &vrect);

        assert!(!engine.builder.working);
        assert!(!engine.lens.valid);
        assert!(engine.lens.pixels.iter().all(|&c| c == LENSPIXEL_NONE));
        assert!(vid.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_forward_build_owner_culling() {
        let mut engine = setup_engine("fwdcull");
        write_lens(&engine, "fwd", FORWARD_ONLY_LENS);
        engine.execute_string("globe cube");
        engine.execute_string("lens fwd");
        engine.execute_string("hfov 90");

        let vrect = VRect { x: 0, y: 0, width: 32, height: 32 };
        let mut stub = StubRefresh::new(32, 32);
        let mut vid = vec![0u8; 32 * 32];
        run_until_built(&mut engine, &mut stub, &mut vid, 32, &vrect);

        assert_eq!(engine.lens.map_type, MapType::Forward);

        let platesize = engine.globe.platesize;
        let platearea = (platesize * platesize) as u32;
        let mut filled = 0;
        for &cell in &engine.lens.pixels {
            if cell == LENSPIXEL_NONE {
                continue;
            }
            filled += 1;
            // every mapped texel belongs to the plate that drew it
            let plate = (cell / platearea) as usize;
            let ty = (cell % platearea) as usize / platesize;
            let tx = (cell % platearea) as usize % platesize;
            let ray = plate_uv_to_ray(
                &engine.globe.plates[plate],
                tx as f64 / platesize as f64,
                ty as f64 / platesize as f64,
            );
            assert_eq!(
                ray_to_plate_index(&engine.script, &engine.globe.plates, &ray),
                plate as i32
            );
        }
        assert!(filled > 100);
    }

    #[test]
    fn test_sliced_build_is_byte_identical() {
        let vrect = VRect { x: 0, y: 0, width: 96, height: 64 };

        let mut oneshot = setup_engine("slice-one");
        oneshot.builder.seconds_per_frame = 10.0;
        oneshot.execute_string("globe cube");
        oneshot.execute_string("lens equirect");
        oneshot.execute_string("hfov 180");
        let mut stub = StubRefresh::new(96, 64);
        let mut vid = vec![0u8; 96 * 64];
        let frames = run_until_built(&mut oneshot, &mut stub, &mut vid, 96, &vrect);
        assert_eq!(frames, 1);

        let mut sliced = setup_engine("slice-many");
        sliced.builder.seconds_per_frame = 0.0003;
        sliced.execute_string("globe cube");
        sliced.execute_string("lens equirect");
        sliced.execute_string("hfov 180");
        let mut stub = StubRefresh::new(96, 64);
        let mut vid = vec![0u8; 96 * 64];
        let frames = run_until_built(&mut sliced, &mut stub, &mut vid, 96, &vrect);
        assert!(frames >= 2, "build finished in {} frame(s)", frames);

        assert_eq!(oneshot.lens.pixels, sliced.lens.pixels);
        assert_eq!(oneshot.lens.pixel_tints, sliced.lens.pixel_tints);
    }

    #[test]
    fn test_sliced_forward_build_is_byte_identical() {
        let vrect = VRect { x: 0, y: 0, width: 48, height: 48 };

        let mut oneshot = setup_engine("fslice-one");
        oneshot.builder.seconds_per_frame = 10.0;
        write_lens(&oneshot, "fwd", FORWARD_ONLY_LENS);
        oneshot.execute_string("globe cube");
        oneshot.execute_string("lens fwd");
        oneshot.execute_string("hfov 180");
        let mut stub = StubRefresh::new(48, 48);
        let mut vid = vec![0u8; 48 * 48];
        run_until_built(&mut oneshot, &mut stub, &mut vid, 48, &vrect);

        let mut sliced = setup_engine("fslice-many");
        sliced.builder.seconds_per_frame = 0.0003;
        write_lens(&sliced, "fwd", FORWARD_ONLY_LENS);
        sliced.execute_string("globe cube");
        sliced.execute_string("lens fwd");
        sliced.execute_string("hfov 180");
        let mut stub = StubRefresh::new(48, 48);
        let mut vid = vec![0u8; 48 * 48];
        let frames = run_until_built(&mut sliced, &mut stub, &mut vid, 48, &vrect);
        assert!(frames >= 2, "build finished in {} frame(s)", frames);

        assert_eq!(oneshot.lens.pixels, sliced.lens.pixels);
        assert_eq!(oneshot.lens.pixel_tints, sliced.lens.pixel_tints);
    }
}
