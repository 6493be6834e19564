use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

use gtk4::prelude::*;
use gtk4::{self as gtk, gdk, gdk_pixbuf, glib, Application, ApplicationWindow, CssProvider, Label};
use gtk4_layer_shell::{Edge, KeyboardMode, Layer, LayerShell};
use tracing::{debug, info, warn};

use super::styles::CSS;
use super::{badge_class, gif_path};
use crate::config::AvatarConfig;
use crate::mood::Mood;

/// Frame timer period. Also how often mood requests are drained.
const FRAME: Duration = Duration::from_millis(100);

struct AvatarWidgets {
    picture: gtk::Picture,
    badge: Label,
    frames: RefCell<Option<gdk_pixbuf::PixbufAnimationIter>>,
    mood: Cell<Option<Mood>>,
}

impl AvatarWidgets {
    fn show(&self, config: &AvatarConfig, mood: Mood) {
        if let Some(previous) = self.mood.replace(Some(mood)) {
            self.badge.remove_css_class(&badge_class(previous));
        }

        let path = gif_path(&config.gif_dir, mood);
        match gdk_pixbuf::PixbufAnimation::from_file(&path) {
            Ok(animation) => {
                let iter = animation.iter(Some(SystemTime::now()));
                self.set_frame(&iter.pixbuf());
                self.frames.replace(Some(iter));
                self.badge.set_visible(false);
                self.picture.set_visible(true);
            }
            Err(e) => {
                debug!("No animation for {mood} at {}: {e}", path.display());
                self.frames.replace(None);
                self.picture.set_visible(false);
                self.badge.set_text(mood.as_str());
                self.badge.add_css_class(&badge_class(mood));
                self.badge.set_visible(true);
            }
        }
    }

    #[allow(deprecated)]
    fn set_frame(&self, pixbuf: &gdk_pixbuf::Pixbuf) {
        let texture = gdk::Texture::for_pixbuf(pixbuf);
        self.picture.set_paintable(Some(&texture));
    }

    fn advance(&self) {
        let frames = self.frames.borrow();
        if let Some(iter) = frames.as_ref()
            && iter.advance(SystemTime::now())
        {
            self.set_frame(&iter.pixbuf());
        }
    }
}

/// Run the avatar window on this thread until it is closed. Moods arrive on
/// `moods`; only the newest pending request is shown.
pub fn run_avatar(config: AvatarConfig, moods: mpsc::Receiver<Mood>) -> anyhow::Result<()> {
    let app = Application::builder()
        .application_id("dev.garmin.avatar")
        .flags(gtk::gio::ApplicationFlags::NON_UNIQUE)
        .build();

    let moods = Rc::new(RefCell::new(Some(moods)));
    app.connect_activate(move |app| {
        // Guard against duplicate activations (GTK single-instance re-activate)
        if app.active_window().is_some() {
            return;
        }
        if let Some(rx) = moods.borrow_mut().take() {
            build_ui(app, config.clone(), rx);
        }
    });

    // GTK application expects &[&str] args; pass empty since we use clap.
    let empty: Vec<String> = vec![];
    app.run_with_args(&empty);
    info!("Avatar closed");
    Ok(())
}

fn build_ui(app: &Application, config: AvatarConfig, rx: mpsc::Receiver<Mood>) {
    let provider = CssProvider::new();
    provider.load_from_data(CSS);
    match gdk::Display::default() {
        Some(display) => gtk::style_context_add_provider_for_display(
            &display,
            &provider,
            gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
        ),
        None => warn!("No default display, avatar styles not loaded"),
    }

    let win = ApplicationWindow::builder()
        .application(app)
        .title("Garmin")
        .default_width(config.width)
        .default_height(config.height)
        .resizable(false)
        .decorated(false)
        .build();

    win.init_layer_shell();
    win.set_layer(Layer::Overlay);
    win.set_anchor(Edge::Bottom, true);
    win.set_anchor(Edge::Right, true);
    win.set_margin(Edge::Bottom, config.margin_bottom);
    win.set_margin(Edge::Right, config.margin_right);
    win.set_keyboard_mode(KeyboardMode::None);

    let stack = gtk::Box::new(gtk::Orientation::Vertical, 0);
    stack.add_css_class("avatar");
    stack.set_size_request(config.width, config.height);

    let picture = gtk::Picture::new();
    picture.set_can_shrink(true);
    picture.set_vexpand(true);
    stack.append(&picture);

    let badge = Label::new(None);
    badge.add_css_class("badge");
    badge.set_halign(gtk::Align::Center);
    badge.set_valign(gtk::Align::Center);
    badge.set_vexpand(true);
    badge.set_visible(false);
    stack.append(&badge);

    win.set_child(Some(&stack));

    let widgets = Rc::new(AvatarWidgets {
        picture,
        badge,
        frames: RefCell::new(None),
        mood: Cell::new(None),
    });

    let key_ctrl = gtk::EventControllerKey::new();
    {
        let app = app.clone();
        key_ctrl.connect_key_pressed(move |_ctrl, keyval, _keycode, _modifier| {
            if keyval == gdk::Key::Escape {
                app.quit();
                glib::Propagation::Stop
            } else {
                glib::Propagation::Proceed
            }
        });
    }
    win.add_controller(key_ctrl);

    // Frame timer, also drains the mood channel
    {
        let w = Rc::clone(&widgets);
        let app = app.clone();
        glib::timeout_add_local(FRAME, move || {
            let mut latest = None;
            loop {
                match rx.try_recv() {
                    Ok(mood) => latest = Some(mood),
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        app.quit();
                        return glib::ControlFlow::Break;
                    }
                }
            }
            if let Some(mood) = latest
                && w.mood.get() != Some(mood)
            {
                w.show(&config, mood);
            }
            w.advance();
            glib::ControlFlow::Continue
        });
    }

    win.present();
}
