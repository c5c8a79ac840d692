fn main() {
    colorscan_lib::run()
}
