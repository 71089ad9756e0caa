use bitflags::bitflags;

bitflags! {
    /// Held controls, as replicated in the temp message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Controls: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const JUMP = 1 << 4;
        const FIRE = 1 << 5;
    }
}

const CONTROL_ORDER: [Controls; 6] = [
    Controls::UP,
    Controls::DOWN,
    Controls::LEFT,
    Controls::RIGHT,
    Controls::JUMP,
    Controls::FIRE,
];

/// Fixed-point shift from tile coordinates to positions.
pub const TILE_SHIFT: u32 = 15;
const INT_SHIFT: u32 = 10;
const LEVEL_HEIGHT_TILES: i32 = 64;

pub const DEFAULT_ENERGY: u8 = 4;
pub const DEFAULT_LIVES: u8 = 3;

pub fn tile_to_fixed(tile: u16) -> i32 {
    i32::from(tile) << TILE_SHIFT
}

/// Live per-tick player state pushed by the owning peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTemp {
    pub controls: Controls,
    pub bird: bool,
    pub ammo: [u16; 4],
    /// -1 means the default blaster.
    pub ammo_type: i8,
    pub score: u32,
    pub energy: u8,
    pub lives: u8,
    pub shield: u8,
    pub floating: bool,
    pub facing_right: bool,
    pub fire_speed: u8,
    pub jump_height: i32,
    pub jump_y: i32,
    pub x: i32,
    pub y: i32,
}

impl Default for PlayerTemp {
    fn default() -> Self {
        Self {
            controls: Controls::empty(),
            bird: false,
            ammo: [0; 4],
            ammo_type: -1,
            score: 0,
            energy: DEFAULT_ENERGY,
            lives: DEFAULT_LIVES,
            shield: 0,
            floating: false,
            facing_right: true,
            fire_speed: 0,
            jump_height: 92 << INT_SHIFT,
            jump_y: LEVEL_HEIGHT_TILES << TILE_SHIFT,
            x: 0,
            y: 0,
        }
    }
}

impl PlayerTemp {
    /// Total length of a P_TEMP message including header and player index.
    pub const MESSAGE_LEN: usize = 46;

    /// Writes bytes 3..45 of a P_TEMP message. `buf` must hold `MESSAGE_LEN`.
    pub fn write(&self, buf: &mut [u8]) {
        for (i, control) in CONTROL_ORDER.iter().enumerate() {
            buf[3 + i] = u8::from(self.controls.contains(*control));
        }
        buf[9] = u8::from(self.bird);
        for (i, ammo) in self.ammo.iter().enumerate() {
            buf[10 + i * 2..12 + i * 2].copy_from_slice(&ammo.to_be_bytes());
        }
        buf[18] = (self.ammo_type as u8).wrapping_add(1);
        buf[19..23].copy_from_slice(&self.score.to_be_bytes());
        buf[23] = self.energy;
        buf[24] = self.lives;
        buf[25] = self.shield;
        buf[26] = u8::from(self.floating);
        buf[27] = u8::from(self.facing_right);
        buf[28] = self.fire_speed;
        buf[29..33].copy_from_slice(&self.jump_height.to_be_bytes());
        buf[33..37].copy_from_slice(&self.jump_y.to_be_bytes());
        buf[37..41].copy_from_slice(&self.x.to_be_bytes());
        buf[41..45].copy_from_slice(&self.y.to_be_bytes());
        buf[45] = 0;
    }

    pub fn read(buf: &[u8]) -> Self {
        let mut controls = Controls::empty();
        for (i, control) in CONTROL_ORDER.iter().enumerate() {
            controls.set(*control, buf[3 + i] != 0);
        }

        let mut ammo = [0u16; 4];
        for (i, slot) in ammo.iter_mut().enumerate() {
            *slot = u16::from_be_bytes([buf[10 + i * 2], buf[11 + i * 2]]);
        }

        let be32 = |at: usize| [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];

        Self {
            controls,
            bird: buf[9] & 1 != 0,
            ammo,
            ammo_type: buf[18].wrapping_sub(1) as i8,
            score: u32::from_be_bytes(be32(19)),
            energy: buf[23],
            lives: buf[24],
            shield: buf[25],
            floating: buf[26] != 0,
            facing_right: buf[27] != 0,
            fire_speed: buf[28],
            jump_height: i32::from_be_bytes(be32(29)),
            jump_y: i32::from_be_bytes(be32(33)),
            x: i32::from_be_bytes(be32(37)),
            y: i32::from_be_bytes(be32(41)),
        }
    }

    /// Clears transient state; lives, ammo and score are kept.
    pub fn reset(&mut self) {
        self.controls = Controls::empty();
        self.energy = DEFAULT_ENERGY;
        self.shield = 0;
        self.floating = false;
        self.facing_right = true;
        self.jump_height = 92 << INT_SHIFT;
        self.jump_y = LEVEL_HEIGHT_TILES << TILE_SHIFT;
    }
}
