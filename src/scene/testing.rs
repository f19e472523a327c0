//! Shared fixtures for tests: a tiny in-memory parts library.

use super::{LoadTicket, Scene, SceneLoader};
use crate::cache::ResourceCache;
use crate::config::StepperConfig;
use crate::device::HeadlessDevice;
use crate::library::MemoryFetcher;
use std::sync::Arc;
use url::Url;

pub(crate) const LIBRARY: &str = "memory:/lib/";
pub(crate) const MODEL: &str = "memory:/models/house.ldr";

const LDCONFIG: &str = "\
0 !COLOUR Black CODE 0 VALUE #1B2A34 EDGE #2B4354
0 !COLOUR Blue CODE 1 VALUE #1E5AA8 EDGE #333333
0 !COLOUR Red CODE 4 VALUE #C91A09 EDGE #333333
0 !COLOUR Brown CODE 6 VALUE #583927 EDGE #1E1E1E
0 !COLOUR Light_Grey CODE 7 VALUE #8A928D EDGE #333333
0 !COLOUR Yellow CODE 14 VALUE #F2CD37 EDGE #333333
0 !COLOUR White CODE 15 VALUE #FFFFFF EDGE #333333
0 !COLOUR Main_Colour CODE 16 VALUE #FFFF80 EDGE #333333
0 !COLOUR Trans_Clear CODE 47 VALUE #FCFCFC EDGE #C3C3C3 ALPHA 128
";

/// 2x4 brick: one quad of its own, a subpart quad and a stud (5 triangles).
const BRICK_2X4: &str = "\
0 Brick 2 x 4
0 !LDRAW_ORG Part UPDATE 2004-03
4 16 -40 0 -20 40 0 -20 40 24 -20 -40 24 -20
1 16 0 0 0 1 0 0 0 1 0 0 0 1 s\\3001s01.dat
";

const BRICK_2X4_SUBPART: &str = "\
0 ~Brick 2 x 4 without Front Face
0 !LDRAW_ORG Subpart
4 16 -40 0 20 40 0 20 40 24 20 -40 24 20
1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud.dat
";

const STUD: &str = "\
0 Stud
0 !LDRAW_ORG Primitive
3 16 0 0 0 6 0 0 0 -4 0
2 24 0 0 0 6 0 0
";

/// 2x2 brick (2 triangles).
const BRICK_2X2: &str = "\
0 Brick 2 x 2
0 !LDRAW_ORG Part
4 16 -20 0 -20 20 0 -20 20 24 -20 -20 24 -20
";

/// Only edge lines: nothing to render.
const EDGES_ONLY: &str = "\
0 Sticker outline
0 !LDRAW_ORG Part
2 24 0 0 0 10 0 0
";

pub(crate) struct Fixture {
    pub fetcher: Arc<MemoryFetcher>,
    pub device: Arc<HeadlessDevice>,
    pub cache: ResourceCache,
    pub loader: SceneLoader,
}

pub(crate) fn config() -> StepperConfig {
    StepperConfig::default().with_library_base(LIBRARY)
}

pub(crate) fn fixture() -> Fixture {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with("memory:/lib/LDConfig.ldr", LDCONFIG)
            .with("memory:/lib/parts/3001.dat", BRICK_2X4)
            .with("memory:/lib/parts/s/3001s01.dat", BRICK_2X4_SUBPART)
            .with("memory:/lib/p/stud.dat", STUD)
            .with("memory:/lib/parts/3003.dat", BRICK_2X2)
            .with("memory:/lib/parts/3068.dat", EDGES_ONLY),
    );
    let device = Arc::new(HeadlessDevice::new());
    let cache = ResourceCache::new(fetcher.clone(), device.clone());
    let loader = SceneLoader::new(cache.clone(), config());
    Fixture {
        fetcher,
        device,
        cache,
        loader,
    }
}

pub(crate) fn model_url() -> Url {
    Url::parse(MODEL).unwrap()
}

impl Fixture {
    pub(crate) async fn load_text(&self, text: &str) -> Scene {
        self.loader
            .load_text(&model_url(), text, &LoadTicket::standalone())
            .await
            .unwrap()
    }
}

/// Three bricks in three steps: red 2x4, red 2x4, grey 2x2.
pub(crate) const THREE_STEPS: &str = "\
0 House
1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat
0 STEP
1 4 0 -24 0 1 0 0 0 1 0 0 0 1 3001.dat
0 STEP
1 7 0 -48 0 1 0 0 0 1 0 0 0 1 3003.dat
0 STEP
";
