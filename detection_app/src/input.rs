use lib_cv::selection::MouseInput;
use opencv::core::Point;
use opencv::highgui;

const KEY_ESC: i32 = 27;
const KEY_FREEZE: i32 = 's' as i32;
const KEY_QUIT: i32 = 'q' as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Freeze,
    Quit,
}

/// Код от wait_key. -1 - клавиша не нажата
pub fn command_from_key(key: i32) -> Option<Command> {
    if key < 0 {
        return None;
    }
    match key & 0xFF {
        KEY_FREEZE => Some(Command::Freeze),
        KEY_ESC | KEY_QUIT => Some(Command::Quit),
        _ => None,
    }
}

/// Событие highgui -> событие для сессии выделения. Правая кнопка, колесо и т.п. игнорируются.
pub fn mouse_input(event: i32, x: i32, y: i32) -> Option<MouseInput> {
    let p = Point::new(x, y);
    match event {
        highgui::EVENT_LBUTTONDOWN => Some(MouseInput::Press(p)),
        highgui::EVENT_MOUSEMOVE => Some(MouseInput::Move(p)),
        highgui::EVENT_LBUTTONUP => Some(MouseInput::Release(p)),
        _ => None,
    }
}
