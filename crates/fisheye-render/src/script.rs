// script.rs — embedded Lua host for lens and globe scripts

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, Table, Value};

use fisheye_common::common::con_printf;
use fisheye_common::mathlib::{vector_normalize, Vec3};

use crate::globe::{plate_uv_to_ray, Plate};

/// Outcome of a call into a scripted projection function.
pub enum Projected<T> {
    Value(T),
    /// The script returned nil: leave the pixel unmapped.
    Skip,
    /// The script returned a malformed value; the current build is aborted.
    Fail,
}

// Shorthands available to every script. Lua 5.4 dropped several of these
// from the math library, so the missing ones get plain Lua definitions.
const MATH_ALIASES: &str = "\
cos = math.cos\n\
sin = math.sin\n\
tan = math.tan\n\
asin = math.asin\n\
acos = math.acos\n\
atan = math.atan\n\
atan2 = math.atan2 or function(y, x) return math.atan(y, x) end\n\
sinh = math.sinh or function(x) return (math.exp(x) - math.exp(-x)) / 2 end\n\
cosh = math.cosh or function(x) return (math.exp(x) + math.exp(-x)) / 2 end\n\
tanh = math.tanh or function(x) local e = math.exp(2 * x) return (e - 1) / (e + 1) end\n\
log = math.log\n\
log10 = math.log10 or function(x) return math.log(x, 10) end\n\
abs = math.abs\n\
sqrt = math.sqrt\n\
exp = math.exp\n\
pi = math.pi\n\
tau = math.pi * 2\n\
pow = math.pow or function(a, b) return a ^ b end\n\
";

pub fn latlon_to_ray(lat: f64, lon: f64) -> Vec3 {
    let clat = lat.cos();
    [lon.sin() * clat, lat.sin(), lon.cos() * clat]
}

pub fn ray_to_latlon(ray: &Vec3) -> (f64, f64) {
    let lon = ray[0].atan2(ray[2]);
    let lat = ray[1].atan2((ray[0] * ray[0] + ray[2] * ray[2]).sqrt());
    (lat, lon)
}

/// Owns the Lua state and the function handles resolved from the current
/// lens and globe scripts.
pub struct ScriptHost {
    lua: Lua,
    pub lens_inverse: Option<Function>,
    pub lens_forward: Option<Function>,
    pub globe_plate: Option<Function>,
    // snapshot of the current plates for the plate_to_ray helper
    plates: Rc<RefCell<Vec<Plate>>>,
}

fn value_number(v: &Value) -> Option<f64> {
    match v {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

fn bind_helpers(lua: &Lua, plates: &Rc<RefCell<Vec<Plate>>>) -> mlua::Result<()> {
    lua.load(MATH_ALIASES).set_name("aliases").exec()?;

    let globals = lua.globals();

    globals.set(
        "latlon_to_ray",
        lua.create_function(|_, (lat, lon): (f64, f64)| {
            let ray = latlon_to_ray(lat, lon);
            Ok((ray[0], ray[1], ray[2]))
        })?,
    )?;

    globals.set(
        "ray_to_latlon",
        lua.create_function(|_, (x, y, z): (f64, f64, f64)| Ok(ray_to_latlon(&[x, y, z])))?,
    )?;

    let shared = Rc::clone(plates);
    globals.set(
        "plate_to_ray",
        lua.create_function(move |_, (index, u, v): (i64, f64, f64)| {
            let plates = shared.borrow();
            if index < 0 || index as usize >= plates.len() {
                return Ok(MultiValue::from_iter([Value::Nil]));
            }
            let ray = plate_uv_to_ray(&plates[index as usize], u, v);
            Ok(MultiValue::from_iter([
                Value::Number(ray[0]),
                Value::Number(ray[1]),
                Value::Number(ray[2]),
            ]))
        })?,
    )?;

    Ok(())
}

impl ScriptHost {
    pub fn new() -> Self {
        let lua = Lua::new();
        let plates = Rc::new(RefCell::new(Vec::new()));
        if let Err(err) = bind_helpers(&lua, &plates) {
            con_printf(&format!("script host init failed: {}\n", err));
        }
        Self {
            lua,
            lens_inverse: None,
            lens_forward: None,
            globe_plate: None,
            plates,
        }
    }

    /// Refresh the plate snapshot used by the plate_to_ray helper. Called
    /// after every globe load.
    pub fn sync_plates(&self, plates: &[Plate]) {
        *self.plates.borrow_mut() = plates.to_vec();
    }

    pub fn globals(&self) -> Table {
        self.lua.globals()
    }

    /// Execute a script chunk. Logs and returns false on error.
    pub fn exec_chunk(&self, chunk: &str, name: &str) -> bool {
        if let Err(err) = self.lua.load(chunk).set_name(name).exec() {
            con_printf(&format!("could not run {}\nERROR: {}\n", name, err));
            return false;
        }
        true
    }

    /// Read and execute a script file. Logs and returns false when the file
    /// is missing or fails to run.
    pub fn load_file(&self, path: &Path) -> bool {
        let chunk = match fs::read_to_string(path) {
            Ok(chunk) => chunk,
            Err(err) => {
                con_printf(&format!(
                    "could not load {}\nERROR: {}\n",
                    path.display(),
                    err
                ));
                return false;
            }
        };
        self.exec_chunk(&chunk, &path.display().to_string())
    }

    /// Clear the globals a lens script may define, so values from the
    /// previous lens cannot leak into the next one.
    pub fn clear_lens_globals(&self, numplates: usize) {
        let globals = self.lua.globals();
        for name in [
            "map",
            "max_hfov",
            "max_vfov",
            "lens_width",
            "lens_height",
            "lens_inverse",
            "lens_forward",
            "onload",
        ] {
            let _ = globals.set(name, Value::Nil);
        }
        let _ = globals.set("numplates", numplates);
    }

    /// Clear the globals a globe script may define.
    pub fn clear_globe_globals(&self) {
        let globals = self.lua.globals();
        for name in ["plates", "globe_plate"] {
            let _ = globals.set(name, Value::Nil);
        }
    }

    pub fn get_function(&self, name: &str) -> Option<Function> {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn get_number(&self, name: &str) -> Option<f64> {
        self.lua
            .globals()
            .get::<Value>(name)
            .ok()
            .as_ref()
            .and_then(value_number)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::String(s)) => Some(s.to_string_lossy().to_string()),
            _ => None,
        }
    }

    /// Map an image coordinate to a unit ray through the current lens_inverse.
    pub fn call_inverse(&self, x: f64, y: f64) -> Projected<Vec3> {
        let Some(func) = &self.lens_inverse else {
            con_printf("lens_inverse is not defined\n");
            return Projected::Fail;
        };
        let ret = match func.call::<MultiValue>((x, y)) {
            Ok(ret) => ret,
            Err(err) => {
                con_printf(&format!("lens_inverse error: {}\n", err));
                return Projected::Fail;
            }
        };
        let vals: Vec<Value> = ret.into_iter().collect();
        match vals.len() {
            3 => {
                let (rx, ry, rz) = (
                    value_number(&vals[0]),
                    value_number(&vals[1]),
                    value_number(&vals[2]),
                );
                match (rx, ry, rz) {
                    (Some(rx), Some(ry), Some(rz)) => {
                        let mut ray = [rx, ry, rz];
                        vector_normalize(&mut ray);
                        Projected::Value(ray)
                    }
                    _ => {
                        con_printf("lens_inverse returned a non-number value for x,y,z\n");
                        Projected::Fail
                    }
                }
            }
            1 if matches!(vals[0], Value::Nil) => Projected::Skip,
            1 => {
                con_printf("lens_inverse returned a single non-nil value\n");
                Projected::Fail
            }
            n => {
                con_printf(&format!("lens_inverse returned {} values instead of 3\n", n));
                Projected::Fail
            }
        }
    }

    /// Map a ray to an image coordinate through the current lens_forward.
    pub fn call_forward(&self, ray: &Vec3) -> Projected<(f64, f64)> {
        let Some(func) = &self.lens_forward else {
            con_printf("lens_forward is not defined\n");
            return Projected::Fail;
        };
        let ret = match func.call::<MultiValue>((ray[0], ray[1], ray[2])) {
            Ok(ret) => ret,
            Err(err) => {
                con_printf(&format!("lens_forward error: {}\n", err));
                return Projected::Fail;
            }
        };
        let vals: Vec<Value> = ret.into_iter().collect();
        match vals.len() {
            2 => match (value_number(&vals[0]), value_number(&vals[1])) {
                (Some(x), Some(y)) => Projected::Value((x, y)),
                _ => {
                    con_printf("lens_forward returned a non-number value for x,y\n");
                    Projected::Fail
                }
            },
            1 if matches!(vals[0], Value::Nil) => Projected::Skip,
            1 => {
                con_printf("lens_forward returned a single non-nil value\n");
                Projected::Fail
            }
            n => {
                con_printf(&format!("lens_forward returned {} values instead of 2\n", n));
                Projected::Fail
            }
        }
    }

    /// Call the script's plate selection override. Returns None when the
    /// function errors or does not produce an integer.
    pub fn call_globe_plate(&self, ray: &Vec3) -> Option<i32> {
        let func = self.globe_plate.as_ref()?;
        let val = match func.call::<Value>((ray[0], ray[1], ray[2])) {
            Ok(val) => val,
            Err(err) => {
                con_printf(&format!("globe_plate error: {}\n", err));
                return None;
            }
        };
        match val {
            Value::Integer(i) => Some(i as i32),
            Value::Number(n) if n.fract() == 0.0 => Some(n as i32),
            _ => None,
        }
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}
