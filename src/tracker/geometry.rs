use crate::pose::Point;

/// 頂点 `vertex` における `a`-`vertex`-`c` の内角（度, 0〜180）
///
/// どちらかのベクトル長が 0 の場合は 0.0 を返す。これは「計算不能」を表すので
/// 実測の 0° と混同しないこと。区別が必要な呼び出し側は [`try_interior_angle`] を使う。
pub fn interior_angle(a: Point, vertex: Point, c: Point) -> f32 {
    try_interior_angle(a, vertex, c).unwrap_or(0.0)
}

/// 内角。縮退入力（長さ 0 のベクトル）なら None
pub fn try_interior_angle(a: Point, vertex: Point, c: Point) -> Option<f32> {
    let (v1x, v1y) = (a.x - vertex.x, a.y - vertex.y);
    let (v2x, v2y) = (c.x - vertex.x, c.y - vertex.y);

    let mag1 = (v1x * v1x + v1y * v1y).sqrt();
    let mag2 = (v2x * v2x + v2y * v2y).sqrt();
    if !(mag1 > 0.0 && mag2 > 0.0) {
        return None;
    }

    let cos = (v1x * v2x + v1y * v2y) / (mag1 * mag2);
    // 浮動小数誤差で |cos| > 1 になるのを吸収
    let angle = cos.clamp(-1.0, 1.0).acos().to_degrees();
    angle.is_finite().then_some(angle)
}

/// p1→p2 の線分の鉛直からの角度（度, 0〜90）
///
/// 画面座標系（Yは下が正）。完全な鉛直で 0°、水平で 90°。
/// 左右どちらへの傾きかは捨てる。
pub fn angle_from_vertical(p1: Point, p2: Point) -> f32 {
    try_angle_from_vertical(p1, p2).unwrap_or(0.0)
}

/// 鉛直からの角度。p1 と p2 が一致する場合は None
pub fn try_angle_from_vertical(p1: Point, p2: Point) -> Option<f32> {
    let dx = (p2.x - p1.x).abs();
    let dy = p2.y - p1.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    // p2 が p1 より上にある（dy < 0）場合でも 0〜90 に収める
    let angle = dx.atan2(dy.abs()).to_degrees();
    angle.is_finite().then_some(angle)
}

/// 両端を含む範囲判定
pub fn in_range(value: f32, lo: f32, hi: f32) -> bool {
    value >= lo && value <= hi
}
