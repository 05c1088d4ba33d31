//! 主题色定义，全局统一使用

use ratatui::style::Color;

/// 粉色（Logo、分类名）
pub const PINK: Color = Color::Rgb(245, 169, 184);
/// 蓝色（包名、进度条）
pub const BLUE: Color = Color::Rgb(91, 206, 250);
/// 选中行背景色
pub const SEL_BG: Color = Color::Rgb(45, 35, 55);
/// 亮白色
pub const BRIGHT_WHITE: Color = Color::Rgb(255, 255, 255);
/// 暗灰色（次要信息）
pub const DIM: Color = Color::Rgb(130, 130, 140);
/// 描述文字灰色（选中行内）
pub const DESC_DIM: Color = Color::Rgb(180, 180, 190);
/// 已安装
pub const OK_GREEN: Color = Color::Rgb(120, 200, 120);
/// 错误提示、可升级标记
pub const DANGER: Color = Color::Rgb(235, 100, 100);
