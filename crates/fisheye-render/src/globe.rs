// globe.rs — plate arrangement parsed from a globe script

use std::f64::consts::PI;
use std::path::Path;

use mlua::{Table, Value};

use fisheye_common::common::con_printf;
use fisheye_common::mathlib::{cross_product, dot_product, vector_ma, vector_normalize, Vec3};

use crate::script::ScriptHost;

pub const MAX_PLATES: usize = 6;

/// One flat perspective view of the globe.
#[derive(Clone)]
pub struct Plate {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    /// full horizontal+vertical field of the unit-square plate, radians
    pub fov: f64,
    /// camera-to-plate distance, 0.5 / tan(fov/2)
    pub dist: f64,
    /// set during a build when any output pixel maps to this plate
    pub display: bool,
}

/// Pending "saveglobe" screenshot request.
#[derive(Default)]
pub struct SaveRequest {
    pub pending: bool,
    pub with_margins: bool,
    pub name: String,
}

pub struct Globe {
    pub name: String,
    pub valid: bool,
    pub changed: bool,
    pub plates: Vec<Plate>,
    /// per-edge pixel count of each square plate render
    pub platesize: usize,
    /// the environment map: all rendered plate views, plate-major
    pub pixels: Vec<u8>,
    pub save: SaveRequest,
}

impl Globe {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            valid: false,
            changed: false,
            plates: Vec::new(),
            platesize: 0,
            pixels: Vec::new(),
            save: SaveRequest::default(),
        }
    }

    pub fn numplates(&self) -> usize {
        self.plates.len()
    }

    /// Cell index of a plate texel within `pixels`.
    pub fn pixel_index(&self, plate: usize, x: usize, y: usize) -> u32 {
        ((plate * self.platesize + y) * self.platesize + x) as u32
    }
}

impl Default for Globe {
    fn default() -> Self {
        Self::new()
    }
}

fn read_vec3(entry: &Table, index: usize, plate_num: usize, which: &str) -> Option<Vec3> {
    let table = match entry.raw_get::<Value>(index) {
        Ok(Value::Table(t)) if t.raw_len() == 3 => t,
        _ => {
            con_printf(&format!(
                "plate {}: {} vector is not a 3d vector\n",
                plate_num, which
            ));
            return None;
        }
    };

    let mut out = [0.0; 3];
    for (j, slot) in out.iter_mut().enumerate() {
        match table.raw_get::<Value>(j + 1) {
            Ok(Value::Integer(i)) => *slot = i as f64,
            Ok(Value::Number(n)) => *slot = n,
            _ => {
                con_printf(&format!(
                    "plate {}: {} vector: element {} not a number\n",
                    plate_num,
                    which,
                    j + 1
                ));
                return None;
            }
        }
    }
    Some(out)
}

/// Execute a globe script and parse its `plates` array. Returns the plates,
/// or None when the script is missing or violates the contract. Forward and
/// up vectors are trusted as supplied; only the basis is re-orthogonalized.
pub fn globe_load(script: &mut ScriptHost, dir: &Path, name: &str) -> Option<Vec<Plate>> {
    script.clear_globe_globals();
    script.globe_plate = None;
    // the outgoing globe's plates are gone as far as scripts are concerned
    script.sync_plates(&[]);

    let path = dir.join(format!("{}.lua", name));
    if !script.load_file(&path) {
        return None;
    }

    script.globe_plate = script.get_function("globe_plate");

    let plates_table = match script.globals().get::<Value>("plates") {
        Ok(Value::Table(t)) => t,
        _ => {
            con_printf("plates must be an array of one or more elements\n");
            return None;
        }
    };

    let len = plates_table.raw_len();
    if len < 1 {
        con_printf("plates must be an array of one or more elements\n");
        return None;
    }
    if len > MAX_PLATES {
        con_printf(&format!(
            "plates cannot have more than {} elements\n",
            MAX_PLATES
        ));
        return None;
    }

    let mut plates = Vec::with_capacity(len);
    for i in 1..=len {
        let entry = match plates_table.raw_get::<Value>(i) {
            Ok(Value::Table(t)) => t,
            _ => {
                con_printf(&format!("plate {}: not a table\n", i));
                return None;
            }
        };

        let forward = read_vec3(&entry, 1, i, "forward")?;
        let up = read_vec3(&entry, 2, i, "up")?;

        let fov_degrees = match entry.raw_get::<Value>(3) {
            Ok(Value::Integer(n)) => n as f64,
            Ok(Value::Number(n)) => n,
            _ => {
                con_printf(&format!("plate {}: fov not a number\n", i));
                return None;
            }
        };

        let fov = fov_degrees * PI / 180.0;
        if fov <= 0.0 {
            con_printf(&format!("plate {}: fov must > 0\n", i));
            return None;
        }
        if fov >= PI {
            con_printf(&format!("plate {}: fov must be less than 180\n", i));
            return None;
        }

        // right from the given up, then re-derive up so the basis is
        // orthogonal even when the script's up is only approximate
        let right = cross_product(&up, &forward);
        let up = cross_product(&forward, &right);
        let dist = 0.5 / (fov / 2.0).tan();

        plates.push(Plate {
            forward,
            right,
            up,
            fov,
            dist,
            display: false,
        });
    }

    Some(plates)
}

/// Select the plate that owns a ray: the script's globe_plate override when
/// defined, otherwise the plate whose forward vector is closest. Returns -1
/// when the override yields nothing usable.
pub fn ray_to_plate_index(script: &ScriptHost, plates: &[Plate], ray: &Vec3) -> i32 {
    if script.globe_plate.is_some() {
        return match script.call_globe_plate(ray) {
            Some(i) if i >= 0 && (i as usize) < plates.len() => i,
            _ => -1,
        };
    }

    // maximum dot product = minimum angle between vectors
    let mut plate_index = 0;
    let mut max_dp = -2.0;
    for (i, plate) in plates.iter().enumerate() {
        let dp = dot_product(ray, &plate.forward);
        if dp > max_dp {
            max_dp = dp;
            plate_index = i as i32;
        }
    }
    plate_index
}

/// World ray for a plate texture coordinate. Texture v increases downward
/// while the plate's up is +y, so v is flipped.
pub fn plate_uv_to_ray(plate: &Plate, u: f64, v: f64) -> Vec3 {
    let u = u - 0.5;
    let v = -(v - 0.5);

    let mut ray = [0.0, 0.0, 0.0];
    ray = vector_ma(&ray, plate.dist, &plate.forward);
    ray = vector_ma(&ray, u, &plate.right);
    ray = vector_ma(&ray, v, &plate.up);
    vector_normalize(&mut ray);
    ray
}

/// Texture coordinate of a ray on a plate. The flag is true when the
/// coordinate lands inside the plate.
pub fn ray_to_plate_uv(plate: &Plate, ray: &Vec3) -> (f64, f64, bool) {
    // the ray in the plate's view frame
    let x = dot_product(&plate.right, ray);
    let y = dot_product(&plate.up, ray);
    let z = dot_product(&plate.forward, ray);

    let u = x / z * plate.dist + 0.5;
    let v = -y / z * plate.dist + 0.5;

    let inside = (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v);
    (u, v, inside)
}
