//! Main menu flows

use std::cell::RefCell;
use std::rc::Rc;

use crate::catalog::TestFixture;
use crate::coroutine::{Coroutine, TestContext, Yielded, YieldUnit, from_iter};
use crate::failure::{TestFailure, ensure};

/// Frames the fake level load takes
const LOAD_FRAMES: u32 = 30;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuModel {
    pub title: String,
    pub open_panel: Option<String>,
    pub loading: bool,
    pub load_progress: u32,
    pub level_loaded: bool,
}

impl MenuModel {
    pub fn main_menu() -> Self {
        Self {
            title: "Ballgame".to_string(),
            ..Default::default()
        }
    }

    pub fn press(&mut self, button: &str) -> Result<(), TestFailure> {
        match button {
            "Play" => {
                self.loading = true;
                self.load_progress = 0;
                Ok(())
            }
            "Settings" => {
                self.open_panel = Some("Settings".to_string());
                Ok(())
            }
            other => Err(TestFailure::new(format!("no button named {}", other))),
        }
    }

    /// Advance one frame of the fake game
    pub fn update(&mut self) {
        if self.loading {
            self.load_progress += 1;
            if self.load_progress >= LOAD_FRAMES {
                self.loading = false;
                self.level_loaded = true;
            }
        }
    }
}

#[derive(Default)]
pub struct MainMenuTests {
    menu: Rc<RefCell<MenuModel>>,
}

impl TestFixture for MainMenuTests {
    fn setup(&mut self) -> Result<(), TestFailure> {
        *self.menu.borrow_mut() = MenuModel::main_menu();
        Ok(())
    }
}

impl MainMenuTests {
    pub fn title_is_shown(&mut self) -> Result<(), TestFailure> {
        let menu = self.menu.borrow();
        ensure(menu.title == "Ballgame", format!("unexpected title {:?}", menu.title))
    }

    /// Presses Play, then pumps the fake game a frame at a time until the
    /// level reports loaded
    pub fn play_button_loads_level(&mut self) -> impl Coroutine + use<> {
        let menu = self.menu.clone();
        let press = Rc::clone(&menu);
        let pump = Rc::clone(&menu);
        let check = menu;

        let steps = std::iter::once_with(move || -> Result<Yielded, TestFailure> {
            press.borrow_mut().press("Play")?;
            Ok(Yielded::Frame)
        })
        .chain((0..LOAD_FRAMES).map(move |_| -> Result<Yielded, TestFailure> {
            pump.borrow_mut().update();
            Ok(Yielded::Frame)
        }))
        .chain(std::iter::once_with(move || {
            let loaded = check.borrow().level_loaded;
            ensure(loaded, "level did not load").map(|_| Yielded::Frame)
        }));
        from_iter(steps)
    }

    pub fn settings_button_opens_panel(
        &mut self,
        ctx: TestContext,
    ) -> impl Future<Output = Result<(), TestFailure>> + use<> {
        let menu = self.menu.clone();
        async move {
            menu.borrow_mut().press("Settings")?;
            let probe = menu.clone();
            ctx.wait(YieldUnit::until(move || probe.borrow().open_panel.is_some()))
                .await;
            ctx.next_frame().await;
            let panel = menu.borrow().open_panel.clone();
            ensure(panel.as_deref() == Some("Settings"), format!("open panel is {:?}", panel))
        }
    }

    pub fn credits_scroll(&mut self) -> Result<(), TestFailure> {
        Err(TestFailure::new("credits screen missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_loads_after_enough_frames() {
        let mut menu = MenuModel::main_menu();
        menu.press("Play").unwrap();
        for _ in 0..LOAD_FRAMES - 1 {
            menu.update();
        }
        assert!(!menu.level_loaded);
        menu.update();
        assert!(menu.level_loaded);
        assert!(menu.press("Quit").is_err());
    }
}
