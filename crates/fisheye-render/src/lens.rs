// lens.rs — lens projection state, script loading, and scale determination

use std::f64::consts::PI;
use std::path::Path;

use fisheye_common::common::con_printf;

use crate::script::{latlon_to_ray, Projected, ScriptHost};

/// Null cell in the lens map.
pub const LENSPIXEL_NONE: u32 = u32::MAX;

/// Which direction the lens map is built in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapType {
    None,
    Inverse,
    Forward,
}

pub struct Lens {
    pub name: String,
    pub valid: bool,
    pub changed: bool,
    pub map_type: MapType,

    /// size of the lens image in its own arbitrary units (0 = not provided)
    pub width: f64,
    pub height: f64,

    /// zoom of the lens image: lens units per output pixel.
    /// The map is only usable when > 0.
    pub scale: f64,

    /// pixel size of the lens view (equal to the screen viewport)
    pub width_px: i32,
    pub height_px: i32,

    /// FOV ceilings from the script, radians (0 = not provided)
    pub max_hfov: f64,
    pub max_vfov: f64,

    /// per output pixel: cell index into the globe pixels, or LENSPIXEL_NONE
    pub pixels: Vec<u32>,

    /// per output pixel: a tint plate index, 255 = no tint.
    /// (new color = tint_table[tint][old color], shown by the rubix overlay)
    pub pixel_tints: Vec<u8>,
}

impl Lens {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            valid: false,
            changed: false,
            map_type: MapType::None,
            width: 0.0,
            height: 0.0,
            scale: -1.0,
            width_px: 0,
            height_px: 0,
            max_hfov: 0.0,
            max_vfov: 0.0,
            pixels: Vec::new(),
            pixel_tints: Vec::new(),
        }
    }
}

impl Default for Lens {
    fn default() -> Self {
        Self::new()
    }
}

/// Which screen dimension an explicit FOV request applies to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FrameAxis {
    None,
    Width,
    Height,
}

/// The active FOV request. Exactly one of hfov/vfov/hfit/vfit/fit is in
/// effect at a time; setting any clears the others.
pub struct FovState {
    /// requested FOV in radians
    pub fov: f64,
    /// explicit requests in degrees, zero when inactive
    pub hfov: f64,
    pub vfov: f64,
    pub fit: bool,
    pub hfit: bool,
    pub vfit: bool,
    pub framesize: FrameAxis,
    pub changed: bool,
}

impl FovState {
    pub fn new() -> Self {
        Self {
            fov: 0.0,
            hfov: 0.0,
            vfov: 0.0,
            fit: false,
            hfit: false,
            vfit: false,
            framesize: FrameAxis::None,
            changed: true,
        }
    }

    pub fn clear(&mut self) {
        self.fit = false;
        self.hfit = false;
        self.vfit = false;
        self.fov = 0.0;
        self.hfov = 0.0;
        self.vfov = 0.0;
        self.framesize = FrameAxis::None;
        self.changed = true;
    }

    pub fn set_hfov(&mut self, degrees: f64) {
        self.clear();
        self.hfov = degrees;
        self.framesize = FrameAxis::Width;
        self.fov = degrees * PI / 180.0;
    }

    pub fn set_vfov(&mut self, degrees: f64) {
        self.clear();
        self.vfov = degrees;
        self.framesize = FrameAxis::Height;
        self.fov = degrees * PI / 180.0;
    }

    pub fn set_hfit(&mut self) {
        self.clear();
        self.hfit = true;
    }

    pub fn set_vfit(&mut self) {
        self.clear();
        self.vfit = true;
    }

    pub fn set_fit(&mut self) {
        self.clear();
        self.fit = true;
    }
}

impl Default for FovState {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a lens script and read its globals into `lens`. Returns false
/// when the script is missing, fails to run, or names an unknown map.
pub fn lens_load(
    script: &mut ScriptHost,
    dir: &Path,
    name: &str,
    numplates: usize,
    lens: &mut Lens,
) -> bool {
    script.clear_lens_globals(numplates);

    let path = dir.join(format!("{}.lua", name));
    if !script.load_file(&path) {
        return false;
    }

    lens.map_type = MapType::None;
    script.lens_inverse = script.get_function("lens_inverse");
    script.lens_forward = script.get_function("lens_forward");

    if script.lens_inverse.is_some() {
        lens.map_type = MapType::Inverse;
    }
    if script.lens_forward.is_some() && lens.map_type == MapType::None {
        lens.map_type = MapType::Forward;
    }

    // map function preference, when given and defined
    if let Some(funcname) = script.get_string("map") {
        match funcname.as_str() {
            "lens_inverse" if script.lens_inverse.is_some() => lens.map_type = MapType::Inverse,
            "lens_forward" if script.lens_forward.is_some() => lens.map_type = MapType::Forward,
            "lens_inverse" | "lens_forward" => {
                con_printf(&format!("map names {} but it is not defined\n", funcname));
            }
            _ => {
                con_printf(&format!("Unsupported map function: {}\n", funcname));
                return false;
            }
        }
    }

    lens.max_hfov = script.get_number("max_hfov").unwrap_or(0.0) * PI / 180.0;
    lens.max_vfov = script.get_number("max_vfov").unwrap_or(0.0) * PI / 180.0;
    lens.width = script.get_number("lens_width").unwrap_or(0.0);
    lens.height = script.get_number("lens_height").unwrap_or(0.0);

    true
}

/// Compute `lens.scale` for the active FOV request. Returns false, leaving
/// `scale <= 0`, when the request cannot be satisfied by this lens.
pub fn determine_lens_scale(script: &ScriptHost, fov: &FovState, lens: &mut Lens) -> bool {
    lens.scale = -1.0;

    if !fov.fit && !fov.hfit && !fov.vfit {
        // scale based on an explicit FOV
        if lens.max_hfov <= 0.0 || lens.max_vfov <= 0.0 {
            con_printf("max_hfov & max_vfov not specified, try \"fit\"\n");
            return false;
        }

        let framesize = match fov.framesize {
            FrameAxis::Width => lens.width_px,
            FrameAxis::Height => lens.height_px,
            FrameAxis::None => {
                con_printf("no FOV set, try \"hfov\"\n");
                return false;
            }
        };

        if fov.framesize == FrameAxis::Width && fov.fov > lens.max_hfov {
            con_printf(&format!(
                "hfov must be less than {}\n",
                (lens.max_hfov * 180.0 / PI) as i32
            ));
            return false;
        } else if fov.framesize == FrameAxis::Height && fov.fov > lens.max_vfov {
            con_printf(&format!(
                "vfov must be less than {}\n",
                (lens.max_vfov * 180.0 / PI) as i32
            ));
            return false;
        }

        if script.lens_forward.is_none() {
            con_printf("Please specify a forward mapping function in your script for FOV scaling\n");
            return false;
        }

        // project a ray at the edge of the requested FOV and see where the
        // lens puts it
        let ray = match fov.framesize {
            FrameAxis::Width => latlon_to_ray(0.0, fov.fov * 0.5),
            _ => latlon_to_ray(fov.fov * 0.5, 0.0),
        };
        match script.call_forward(&ray) {
            Projected::Value((x, y)) => {
                let edge = if fov.framesize == FrameAxis::Width { x } else { y };
                lens.scale = edge.abs() / (framesize as f64 * 0.5);
            }
            _ => {
                con_printf("lens_forward did not return a valid value for determining FOV scale\n");
                return false;
            }
        }
    } else if fov.hfit {
        if lens.width <= 0.0 {
            con_printf("lens_width not specified.  Try hfov instead.\n");
            return false;
        }
        lens.scale = lens.width / lens.width_px as f64;
    } else if fov.vfit {
        if lens.height <= 0.0 {
            con_printf("lens_height not specified.  Try vfov instead.\n");
            return false;
        }
        lens.scale = lens.height / lens.height_px as f64;
    } else if fov.fit {
        if lens.width <= 0.0 && lens.height > 0.0 {
            lens.scale = lens.height / lens.height_px as f64;
        } else if lens.height <= 0.0 && lens.width > 0.0 {
            lens.scale = lens.width / lens.width_px as f64;
        } else if lens.height <= 0.0 && lens.width <= 0.0 {
            con_printf("lens_width and lens_height not specified.  Try hfov instead.\n");
            return false;
        } else if lens.width / lens.height > lens.width_px as f64 / lens.height_px as f64 {
            lens.scale = lens.width / lens.width_px as f64;
        } else {
            lens.scale = lens.height / lens.height_px as f64;
        }
    }

    if lens.scale <= 0.0 {
        con_printf(&format!(
            "scale determination produced {}, which is <= 0\n",
            lens.scale
        ));
        return false;
    }

    true
}
