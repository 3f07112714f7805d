// commands.rs — console commands bound to the fisheye engine

use std::fs;

use fisheye_common::cmd::{atof, atoi, CmdArgs};
use fisheye_common::common::con_printf;
use fisheye_common::completion::{complete_in_dir, CompletionResult};

use crate::engine::FisheyeEngine;
use crate::globe::globe_load;
use crate::lens::lens_load;
use crate::palette::dump_palette;

type CmdHandler = fn(&mut FisheyeEngine, &CmdArgs);

const COMMANDS: &[(&str, CmdHandler)] = &[
    ("fisheye", FisheyeEngine::cmd_fisheye),
    ("lens", FisheyeEngine::cmd_lens),
    ("globe", FisheyeEngine::cmd_globe),
    ("hfov", FisheyeEngine::cmd_hfov),
    ("vfov", FisheyeEngine::cmd_vfov),
    ("hfit", FisheyeEngine::cmd_hfit),
    ("vfit", FisheyeEngine::cmd_vfit),
    ("fit", FisheyeEngine::cmd_fit),
    ("rubix", FisheyeEngine::cmd_rubix),
    ("rubixgrid", FisheyeEngine::cmd_rubixgrid),
    ("saveglobe", FisheyeEngine::cmd_saveglobe),
    ("dumppal", FisheyeEngine::cmd_dumppal),
];

impl FisheyeEngine {
    /// True when the command name belongs to the fisheye subsystem.
    pub fn is_command(name: &str) -> bool {
        COMMANDS.iter().any(|(cmd, _)| cmd.eq_ignore_ascii_case(name))
    }

    /// Dispatch a console line. Returns false when the command is not one
    /// of ours, so the host console can fall through.
    pub fn execute_string(&mut self, text: &str) -> bool {
        let args = CmdArgs::tokenize(text);
        if args.argc() == 0 {
            return false;
        }

        let name = args.argv(0).to_ascii_lowercase();
        for (cmd, handler) in COMMANDS {
            if *cmd == name {
                handler(self, &args);
                return true;
            }
        }
        false
    }

    /// Complete a script-name argument for the lens and globe commands.
    pub fn complete_argument(&self, command: &str, partial: &str) -> Option<CompletionResult> {
        match command {
            "lens" => Some(complete_in_dir(&self.lenses_dir(), partial, ".lua")),
            "globe" => Some(complete_in_dir(&self.globes_dir(), partial, ".lua")),
            _ => None,
        }
    }

    fn cmd_fisheye(&mut self, args: &CmdArgs) {
        if args.argc() < 2 {
            con_printf(&format!("Currently: fisheye {}\n", self.enabled as i32));
            return;
        }
        self.enabled = atoi(args.argv(1)) != 0;
    }

    fn cmd_lens(&mut self, args: &CmdArgs) {
        if args.argc() < 2 {
            con_printf("lens <name>: use a new lens\n");
            con_printf(&format!("Currently: {}\n", self.lens.name));
            return;
        }

        self.lens.changed = true;
        self.lens.name = args.argv(1).to_string();

        let dir = self.lenses_dir();
        let name = self.lens.name.clone();
        self.lens.valid = lens_load(
            &mut self.script,
            &dir,
            &name,
            self.globe.numplates(),
            &mut self.lens,
        );
        if !self.lens.valid {
            self.lens.name.clear();
            con_printf("not a valid lens\n");
        }

        // run the lens' onload command string if given (a user-friendly
        // default view, e.g. "hfov 180")
        if let Some(onload) = self.script.get_string("onload") {
            self.execute_string(&onload);
        }
    }

    fn cmd_globe(&mut self, args: &CmdArgs) {
        if args.argc() < 2 {
            con_printf("globe <name>: use a new globe\n");
            con_printf(&format!("Currently: {}\n", self.globe.name));
            return;
        }

        self.globe.changed = true;
        self.globe.name = args.argv(1).to_string();

        let dir = self.globes_dir();
        let name = self.globe.name.clone();
        match globe_load(&mut self.script, &dir, &name) {
            Some(plates) => {
                self.globe.plates = plates;
                self.globe.valid = true;
            }
            None => {
                self.globe.plates.clear();
                self.globe.valid = false;
                self.globe.name.clear();
                con_printf("not a valid globe\n");
            }
        }
        self.script.sync_plates(&self.globe.plates);
    }

    fn print_active_fov(&self) {
        if self.fov.hfov != 0.0 {
            con_printf(&format!("Currently: hfov {}\n", self.fov.hfov as i32));
        } else if self.fov.vfov != 0.0 {
            con_printf(&format!("Currently: vfov {}\n", self.fov.vfov as i32));
        }
    }

    fn cmd_hfov(&mut self, args: &CmdArgs) {
        if args.argc() < 2 {
            con_printf("hfov <degrees>: set horizontal FOV\n");
            self.print_active_fov();
            return;
        }
        self.fov.set_hfov(atof(args.argv(1)));
    }

    fn cmd_vfov(&mut self, args: &CmdArgs) {
        if args.argc() < 2 {
            con_printf("vfov <degrees>: set vertical FOV\n");
            self.print_active_fov();
            return;
        }
        self.fov.set_vfov(atof(args.argv(1)));
    }

    fn cmd_hfit(&mut self, _args: &CmdArgs) {
        self.fov.set_hfit();
    }

    fn cmd_vfit(&mut self, _args: &CmdArgs) {
        self.fov.set_vfit();
    }

    fn cmd_fit(&mut self, _args: &CmdArgs) {
        self.fov.set_fit();
    }

    fn cmd_rubix(&mut self, _args: &CmdArgs) {
        self.rubix.enabled = !self.rubix.enabled;
        con_printf(&format!(
            "Rubix is {}\n",
            if self.rubix.enabled { "ON" } else { "OFF" }
        ));
    }

    fn cmd_rubixgrid(&mut self, args: &CmdArgs) {
        if args.argc() == 4 {
            self.rubix.numcells = atoi(args.argv(1));
            self.rubix.cell_size = atof(args.argv(2));
            self.rubix.pad_size = atof(args.argv(3));
            // the grid is baked into the lens map
            self.lens.changed = true;
        } else {
            con_printf("rubixgrid <numcells> <cellsize> <padsize>\n");
            con_printf(&format!("   numcells (default 10) = {}\n", self.rubix.numcells));
            con_printf(&format!("   cellsize (default  4) = {}\n", self.rubix.cell_size));
            con_printf(&format!("   padsize  (default  1) = {}\n", self.rubix.pad_size));
        }
    }

    fn cmd_saveglobe(&mut self, args: &CmdArgs) {
        if args.argc() < 2 {
            con_printf("saveglobe <name> [with margins=0]: screenshot the globe plates\n");
            return;
        }

        self.globe.save.name = args.argv(1).to_string();
        self.globe.save.with_margins = args.argc() >= 3 && atoi(args.argv(2)) != 0;
        self.globe.save.pending = true;
    }

    fn cmd_dumppal(&mut self, _args: &CmdArgs) {
        let path = self.gamedir().join("palette");
        match fs::File::create(&path) {
            Ok(mut file) => {
                if dump_palette(&self.base_palette, &mut file).is_err() {
                    con_printf("could not write \"palette\"\n");
                }
            }
            Err(_) => con_printf("could not open \"palette\" for writing\n"),
        }
    }
}
