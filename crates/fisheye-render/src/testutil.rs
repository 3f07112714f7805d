// test support: script trees on disk and a stub host renderer

use std::fs;
use std::path::PathBuf;

use crate::engine::FisheyeEngine;
use crate::frame::{PlateView, Refresh, VRect, VidSurface};

pub const CUBE_GLOBE: &str = "\
plates = {
   { { 0, 0, 1 }, { 0, 1, 0 }, 90 },
   { { 1, 0, 0 }, { 0, 1, 0 }, 90 },
   { { -1, 0, 0 }, { 0, 1, 0 }, 90 },
   { { 0, 0, -1 }, { 0, 1, 0 }, 90 },
   { { 0, 1, 0 }, { 0, 0, -1 }, 90 },
   { { 0, -1, 0 }, { 0, 0, 1 }, 90 }
}
";

pub const EQUIRECT_LENS: &str = "\
max_hfov = 360
max_vfov = 180
lens_width = tau
lens_height = pi
map = \"lens_inverse\"

function lens_inverse(x, y)
   if abs(x) > pi or abs(y) > pi / 2 then
      return nil
   end
   return latlon_to_ray(y, x)
end

function lens_forward(x, y, z)
   local lat, lon = ray_to_latlon(x, y, z)
   return lon, lat
end
";

/// 256-level grayscale palette: index i holds (i, i, i).
pub fn gray_palette() -> [u8; 768] {
    let mut pal = [0u8; 768];
    for i in 0..256 {
        pal[i * 3] = i as u8;
        pal[i * 3 + 1] = i as u8;
        pal[i * 3 + 2] = i as u8;
    }
    pal
}

/// Build a game directory tree under the temp dir with the default cube
/// globe and equirect lens, and an engine pointed at it.
pub fn setup_engine(tag: &str) -> FisheyeEngine {
    let root = std::env::temp_dir().join(format!("fisheye-eng-{}-{}", tag, std::process::id()));
    let gamedir = root.join("id1");
    fs::create_dir_all(&gamedir).unwrap();
    fs::create_dir_all(root.join("lenses")).unwrap();
    fs::create_dir_all(root.join("globes")).unwrap();
    fs::write(root.join("globes").join("cube.lua"), CUBE_GLOBE).unwrap();
    fs::write(root.join("lenses").join("equirect.lua"), EQUIRECT_LENS).unwrap();

    let mut engine = FisheyeEngine::new(&gamedir);
    engine.set_palette(&gray_palette());
    engine
}

pub fn write_lens(engine: &FisheyeEngine, name: &str, body: &str) {
    fs::write(engine.lenses_dir().join(format!("{}.lua", name)), body).unwrap();
}

/// Stub host renderer. Fills its framebuffer with a code derived from the
/// dominant axis of the requested view direction, so each cube plate gets a
/// distinct, frame-stable color: +x 20, -x 21, +y 22, -y 23, +z 24, -z 25.
pub struct StubRefresh {
    pub fb: Vec<u8>,
    pub rowbytes: usize,
    pub renders: usize,
}

impl StubRefresh {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            fb: vec![0; width * height],
            rowbytes: width,
            renders: 0,
        }
    }
}

pub fn axis_code(forward: &[f64; 3]) -> u8 {
    let mut d = 0;
    for i in 1..3 {
        if forward[i].abs() > forward[d].abs() {
            d = i;
        }
    }
    20 + (d as u8) * 2 + if forward[d] < 0.0 { 1 } else { 0 }
}

impl Refresh for StubRefresh {
    fn render_view(&mut self, view: &PlateView) {
        let code = axis_code(&view.forward);
        self.fb.fill(code);
        self.renders += 1;
    }

    fn framebuffer(&self) -> (&[u8], usize) {
        (&self.fb, self.rowbytes)
    }
}

/// Run one engine frame with zeroed view angles.
pub fn run_frame(
    engine: &mut FisheyeEngine,
    stub: &mut StubRefresh,
    vidbuf: &mut [u8],
    rowbytes: usize,
    vrect: &VRect,
) {
    let mut vid = VidSurface {
        pixels: vidbuf,
        rowbytes,
    };
    engine.render_frame(stub, &[0.0, 0.0, 0.0], &mut vid, vrect);
}

/// Run frames until the lens map build settles. Returns the frame count.
pub fn run_until_built(
    engine: &mut FisheyeEngine,
    stub: &mut StubRefresh,
    vidbuf: &mut [u8],
    rowbytes: usize,
    vrect: &VRect,
) -> usize {
    let mut frames = 0;
    loop {
        run_frame(engine, stub, vidbuf, rowbytes, vrect);
        frames += 1;
        if !engine.builder.working {
            return frames;
        }
        assert!(frames < 100_000, "lens map build never finished");
    }
}

/// Build a game directory tree populated with the lens and globe scripts
/// shipped at the repository root, so tests can exercise the real assets.
pub fn setup_engine_with_assets(tag: &str) -> FisheyeEngine {
    let repo = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let root = std::env::temp_dir().join(format!("fisheye-assets-{}-{}", tag, std::process::id()));
    let gamedir = root.join("id1");
    fs::create_dir_all(&gamedir).unwrap();

    for sub in ["lenses", "globes"] {
        let dst = root.join(sub);
        fs::create_dir_all(&dst).unwrap();
        for entry in fs::read_dir(repo.join(sub)).unwrap().flatten() {
            fs::copy(entry.path(), dst.join(entry.file_name())).unwrap();
        }
    }

    let mut engine = FisheyeEngine::new(&gamedir);
    engine.set_palette(&gray_palette());
    engine
}
